//! Stage executor.
//!
//! Runs one collaborator call under a [`StagePolicy`]: each attempt is bounded
//! by the per-attempt timeout, failed attempts are retried with backoff, and
//! cancellation or the workflow deadline interrupt both the in-flight call and
//! the backoff sleep. The executor only reports what happened; deciding
//! whether a failure is fatal belongs to [`super::policy`].

use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use tokio::time::Instant;
use tracing::debug;

use super::retry::{should_retry, RetryDecision, RetryState, StagePolicy};
use crate::cancellation::CancellationToken;
use crate::collaborators::CollaboratorResult;
use crate::observability::SpanTimer;
use crate::stages::{StageErrorKind, StageFailure, StageResult};

/// The recorded result of a stage plus its typed output on success.
#[derive(Debug)]
pub struct StageExecution<T> {
    /// The stage result to record.
    pub result: StageResult,
    /// The collaborator output, present iff the stage completed.
    pub output: Option<T>,
}

impl<T> StageExecution<T> {
    /// Returns true if the stage completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

enum Interrupt {
    Cancelled,
    Deadline,
}

impl Interrupt {
    fn into_failure(self, cancellation: &CancellationToken) -> StageFailure {
        match self {
            Self::Cancelled => StageFailure::new(
                StageErrorKind::Cancelled,
                cancellation
                    .reason()
                    .unwrap_or_else(|| "cancelled".to_string()),
            ),
            Self::Deadline => {
                StageFailure::new(StageErrorKind::DeadlineExceeded, "workflow deadline exceeded")
            }
        }
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Returns the interrupt failure if the workflow is cancelled or past its
/// deadline.
pub(crate) fn check_interrupt(
    cancellation: &CancellationToken,
    deadline: Option<Instant>,
) -> Option<StageFailure> {
    let interrupt = if cancellation.is_cancelled() {
        Interrupt::Cancelled
    } else if deadline.is_some_and(|at| Instant::now() >= at) {
        Interrupt::Deadline
    } else {
        return None;
    };
    Some(interrupt.into_failure(cancellation))
}

/// Executes a stage's collaborator call.
///
/// `call` is invoked once per attempt. The output is serialized into the
/// stage result's payload; a value that cannot be serialized fails the stage.
pub async fn execute<T, F, Fut>(
    stage: &str,
    policy: &StagePolicy,
    cancellation: &CancellationToken,
    deadline: Option<Instant>,
    mut call: F,
) -> StageExecution<T>
where
    T: Serialize,
    F: FnMut() -> Fut,
    Fut: Future<Output = CollaboratorResult<T>>,
{
    let started_at = Utc::now();
    let timer = SpanTimer::start(stage);
    let mut state = RetryState::new();

    let outcome: Result<T, StageFailure> = loop {
        if let Some(failure) = check_interrupt(cancellation, deadline) {
            break Err(failure);
        }

        state.begin_attempt();
        debug!(stage, attempt = state.attempts, "Starting attempt");

        let attempt = tokio::time::timeout(policy.timeout(), call());
        let attempt_result = tokio::select! {
            biased;
            () = cancellation.cancelled() => break Err(Interrupt::Cancelled.into_failure(cancellation)),
            () = deadline_reached(deadline) => break Err(Interrupt::Deadline.into_failure(cancellation)),
            r = attempt => r,
        };

        let (failure, retryable) = match attempt_result {
            Ok(Ok(value)) => break Ok(value),
            Ok(Err(e)) => {
                let retryable = e.is_retryable();
                (StageFailure::new(StageErrorKind::Collaborator, e.to_string()), retryable)
            }
            Err(_) => (
                StageFailure::new(
                    StageErrorKind::Timeout,
                    format!("attempt {} exceeded {}ms", state.attempts, policy.timeout_ms),
                ),
                true,
            ),
        };

        match should_retry(&mut state, &policy.retry, retryable) {
            RetryDecision::Retry(delay) => {
                debug!(
                    stage,
                    attempt = state.attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %failure,
                    "Retrying after error"
                );
                tokio::select! {
                    biased;
                    () = cancellation.cancelled() => break Err(Interrupt::Cancelled.into_failure(cancellation)),
                    () = deadline_reached(deadline) => break Err(Interrupt::Deadline.into_failure(cancellation)),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::GiveUp | RetryDecision::NotRetryable => break Err(failure),
        }
    };

    let (mut result, output) = match outcome {
        Ok(value) => match serde_json::to_value(&value) {
            Ok(payload) => (StageResult::completed(stage, started_at, payload), Some(value)),
            Err(e) => (
                StageResult::failed(
                    stage,
                    started_at,
                    StageFailure::new(StageErrorKind::Serialization, e.to_string()),
                ),
                None,
            ),
        },
        Err(failure) => (StageResult::failed(stage, started_at, failure), None),
    };

    result.attempts = state.attempts;
    result.elapsed_ms = timer.finish();
    StageExecution { result, output }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CollaboratorError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting() -> (Arc<AtomicU32>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (calls.clone(), calls)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let token = CancellationToken::new();
        let execution = execute("cost_estimation", &StagePolicy::immediate(), &token, None, || async {
            Ok::<_, CollaboratorError>(42u32)
        })
        .await;

        assert!(execution.is_success());
        assert_eq!(execution.output, Some(42));
        assert_eq!(execution.result.attempts, 1);
        assert_eq!(execution.result.output, Some(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn test_success_after_retryable_failures() {
        let token = CancellationToken::new();
        let (calls, seen) = counting();

        let execution = execute("code_analysis", &StagePolicy::immediate(), &token, None, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(CollaboratorError::unavailable("503"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert!(execution.is_success());
        assert_eq!(execution.result.attempts, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let token = CancellationToken::new();
        let execution = execute("code_analysis", &StagePolicy::immediate(), &token, None, || async {
            Err::<(), _>(CollaboratorError::transport("connection reset"))
        })
        .await;

        assert!(execution.result.is_failure());
        assert!(execution.output.is_none());
        assert_eq!(execution.result.attempts, 3);
        assert_eq!(execution.result.error_kind(), Some(StageErrorKind::Collaborator));
    }

    #[tokio::test]
    async fn test_non_retryable_stops_early() {
        let token = CancellationToken::new();
        let (calls, seen) = counting();

        let execution = execute("infrastructure_generation", &StagePolicy::immediate(), &token, None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(CollaboratorError::rejected("bad provider")) }
        })
        .await;

        assert_eq!(execution.result.attempts, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(execution.result.error.unwrap().message.contains("bad provider"));
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let token = CancellationToken::new();
        let policy = StagePolicy::immediate().with_timeout_ms(20).with_max_attempts(2);

        let execution = execute("golden_images", &policy, &token, None, || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, CollaboratorError>(())
        })
        .await;

        assert_eq!(execution.result.attempts, 2);
        assert_eq!(execution.result.error_kind(), Some(StageErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_attempt() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel("operator stop");
        });

        let policy = StagePolicy::immediate().with_timeout_ms(60_000);
        let execution = execute("deployment", &policy, &token, None, || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, CollaboratorError>(())
        })
        .await;

        let error = execution.result.error.unwrap();
        assert_eq!(error.kind, StageErrorKind::Cancelled);
        assert_eq!(error.message, "operator stop");
        assert_eq!(execution.result.attempts, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_attempt() {
        let token = CancellationToken::new();
        token.cancel("shutdown");
        let (calls, seen) = counting();

        let execution = execute("code_analysis", &StagePolicy::immediate(), &token, None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CollaboratorError>(()) }
        })
        .await;

        assert_eq!(execution.result.attempts, 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(execution.result.error_kind(), Some(StageErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_interrupts_backoff() {
        let token = CancellationToken::new();
        let mut policy = StagePolicy::immediate();
        policy.retry.base_delay_ms = 60_000;
        policy.retry.max_delay_ms = 60_000;
        let deadline = Instant::now() + Duration::from_millis(30);

        let execution = execute("code_analysis", &policy, &token, Some(deadline), || async {
            Err::<(), _>(CollaboratorError::unavailable("503"))
        })
        .await;

        assert_eq!(execution.result.attempts, 1);
        assert_eq!(execution.result.error_kind(), Some(StageErrorKind::DeadlineExceeded));
        assert!(execution.result.elapsed_ms < 5_000);
    }
}
