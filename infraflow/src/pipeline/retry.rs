//! Per-stage retry and timeout policy.
//!
//! Backoff is computed per attempt from a [`RetryConfig`]; a [`StagePolicy`]
//! pairs it with the per-attempt timeout. Both are plain data loaded from
//! configuration.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ConfigError;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Retry behaviour for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates the default retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that retries without waiting.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }
}

/// Timeout and retry policy applied by the stage executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagePolicy {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retry behaviour.
    pub retry: RetryConfig,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 5 * 60 * 1_000,
            retry: RetryConfig::default(),
        }
    }
}

impl StagePolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(timeout_ms: u64, retry: RetryConfig) -> Self {
        Self { timeout_ms, retry }
    }

    /// Three attempts, zero-wait backoff and a short timeout.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            timeout_ms: 1_000,
            retry: RetryConfig::immediate(3),
        }
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the attempt limit.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPolicy`] for a zero timeout, zero
    /// attempts, or a base delay above the cap.
    pub fn validate(&self, stage: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPolicy {
            stage: stage.to_string(),
            reason: reason.to_string(),
        };
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid("base_delay_ms exceeds max_delay_ms"));
        }
        Ok(())
    }
}

/// Tracks attempts for one stage execution.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts made so far.
    pub attempts: u32,
    previous_delay_ms: Option<u64>,
}

impl RetryState {
    /// Creates a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that an attempt is starting.
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Returns true if the attempt limit has been reached.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempts >= config.max_attempts
    }

    /// Calculates the delay before the next attempt.
    #[must_use]
    pub fn calculate_delay(&mut self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let retry = self.attempts.saturating_sub(1);

        let delay = match config.backoff {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retry)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match config.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay_ms.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                let next = if upper <= base {
                    base.min(max)
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                };
                self.previous_delay_ms = Some(next);
                next
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Outcome of a retry decision after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// Attempts exhausted.
    GiveUp,
    /// The error is not retryable.
    NotRetryable,
}

/// Decides what to do after a failed attempt.
#[must_use]
pub fn should_retry(state: &mut RetryState, config: &RetryConfig, retryable: bool) -> RetryDecision {
    if !retryable {
        return RetryDecision::NotRetryable;
    }
    if state.is_exhausted(config) {
        return RetryDecision::GiveUp;
    }
    RetryDecision::Retry(state.calculate_delay(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn after_attempts(attempts: u32) -> RetryState {
        RetryState {
            attempts,
            ..RetryState::default()
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = StagePolicy::default();
        assert_eq!(policy.timeout(), Duration::from_secs(300));
        assert_eq!(policy.retry.max_attempts, 3);
        assert_eq!(policy.retry.base_delay_ms, 1_000);
        assert_eq!(policy.retry.max_delay_ms, 30_000);
        assert_eq!(policy.retry.backoff, BackoffStrategy::Exponential);
        assert_eq!(policy.retry.jitter, JitterStrategy::Full);
    }

    #[test]
    fn test_exponential_no_jitter() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None);

        assert_eq!(after_attempts(1).calculate_delay(&config), Duration::from_millis(100));
        assert_eq!(after_attempts(2).calculate_delay(&config), Duration::from_millis(200));
        assert_eq!(after_attempts(3).calculate_delay(&config), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_and_constant() {
        let linear = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);
        assert_eq!(after_attempts(3).calculate_delay(&linear), Duration::from_millis(300));

        let constant = linear.with_backoff(BackoffStrategy::Constant);
        assert_eq!(after_attempts(6).calculate_delay(&constant), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay_ms(1_000)
            .with_max_delay_ms(5_000)
            .with_jitter(JitterStrategy::None);

        assert_eq!(after_attempts(11).calculate_delay(&config), Duration::from_millis(5_000));
    }

    #[test]
    fn test_jitter_bounds() {
        let full = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant);
        let equal = full.clone().with_jitter(JitterStrategy::Equal);
        let decorrelated = full
            .clone()
            .with_max_delay_ms(250)
            .with_jitter(JitterStrategy::Decorrelated);

        let mut state = after_attempts(1);
        for _ in 0..20 {
            assert!(state.calculate_delay(&full) <= Duration::from_millis(100));
            let d = state.calculate_delay(&equal);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
            let d = state.calculate_delay(&decorrelated);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_immediate_has_zero_delay() {
        let config = RetryConfig::immediate(3);
        assert_eq!(after_attempts(2).calculate_delay(&config), Duration::ZERO);
    }

    #[test]
    fn test_should_retry() {
        let config = RetryConfig::immediate(3);
        let mut state = RetryState::new();

        state.begin_attempt();
        assert!(matches!(should_retry(&mut state, &config, true), RetryDecision::Retry(_)));
        assert_eq!(should_retry(&mut state, &config, false), RetryDecision::NotRetryable);

        state.begin_attempt();
        state.begin_attempt();
        assert_eq!(should_retry(&mut state, &config, true), RetryDecision::GiveUp);
    }

    #[test]
    fn test_policy_validation() {
        assert!(StagePolicy::default().validate("default").is_ok());
        assert!(StagePolicy::default().with_timeout_ms(0).validate("x").is_err());
        assert!(StagePolicy::default().with_max_attempts(0).validate("x").is_err());

        let mut policy = StagePolicy::default();
        policy.retry.base_delay_ms = 60_000;
        let err = policy.validate("deployment").unwrap_err();
        assert!(err.to_string().contains("deployment"));
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: StagePolicy = toml::from_str(
            r#"
            timeout_ms = 2000
            [retry]
            max_attempts = 5
            backoff = "linear"
            jitter = "none"
            "#,
        )
        .unwrap();

        assert_eq!(policy.timeout_ms, 2_000);
        assert_eq!(policy.retry.max_attempts, 5);
        assert_eq!(policy.retry.backoff, BackoffStrategy::Linear);
        assert_eq!(policy.retry.base_delay_ms, 1_000);
    }
}
