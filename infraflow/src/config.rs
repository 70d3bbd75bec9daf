//! Engine configuration.
//!
//! Loaded from TOML, then adjusted from the environment:
//!
//! | Variable | Field |
//! |---|---|
//! | `QINFRA_URL` | `endpoints.qinfra_url` |
//! | `QUANTUM_DROPS_URL` | `endpoints.drops_url` |
//! | `INFRAFLOW_DEADLINE_SECS` | `deadline_ms`, given in seconds (`0` disables the deadline) |
//!
//! ```toml
//! deadline_ms = 1800000
//! hardening_profile = "CIS"
//!
//! [default_policy]
//! timeout_ms = 300000
//!
//! [stages.deployment]
//! timeout_ms = 900000
//! retry = { max_attempts = 1 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::observability::LogFormat;
use crate::pipeline::StagePolicy;
use crate::stages::StageId;

/// Infrastructure service URL variable.
pub const ENV_QINFRA_URL: &str = "QINFRA_URL";
/// Artifact service URL variable.
pub const ENV_DROPS_URL: &str = "QUANTUM_DROPS_URL";
/// Overall workflow deadline variable, in seconds.
pub const ENV_DEADLINE_SECS: &str = "INFRAFLOW_DEADLINE_SECS";

/// Base URLs and client settings for the HTTP collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpEndpoints {
    /// Infrastructure service base URL.
    pub qinfra_url: String,
    /// Artifact (drops) service base URL.
    pub drops_url: String,
    /// Per-request client timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for HttpEndpoints {
    fn default() -> Self {
        Self {
            qinfra_url: "http://qinfra.infraflow.svc.cluster.local:8095".to_string(),
            drops_url: "http://quantum-drops.infraflow.svc.cluster.local:8090".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

fn default_sop_operations() -> Vec<String> {
    ["deployment", "scaling", "backup", "disaster-recovery", "incident-response"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Configuration for the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Policy for stages without an override.
    pub default_policy: StagePolicy,
    /// Per-stage policy overrides, keyed by stage name.
    pub stages: BTreeMap<String, StagePolicy>,
    /// Optional end-to-end workflow deadline in milliseconds.
    pub deadline_ms: Option<u64>,
    /// Hardening profile passed to the image builder.
    pub hardening_profile: String,
    /// Operations the SOP generator produces runbooks for.
    pub sop_operations: Vec<String>,
    /// Collaborator endpoints.
    pub endpoints: HttpEndpoints,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_policy: StagePolicy::default(),
            stages: BTreeMap::new(),
            deadline_ms: None,
            hardening_profile: "CIS".to_string(),
            sop_operations: default_sop_operations(),
            endpoints: HttpEndpoints::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-wait retries and short timeouts for every stage.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            default_policy: StagePolicy::immediate(),
            ..Self::default()
        }
    }

    /// Sets the default stage policy.
    #[must_use]
    pub fn with_default_policy(mut self, policy: StagePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Overrides the policy of one stage.
    #[must_use]
    pub fn with_stage_policy(mut self, stage: StageId, policy: StagePolicy) -> Self {
        self.stages.insert(stage.name().to_string(), policy);
        self
    }

    /// Sets the overall workflow deadline, kept at millisecond precision.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the collaborator endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: HttpEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Returns the policy that applies to a stage.
    #[must_use]
    pub fn policy_for(&self, stage: StageId) -> &StagePolicy {
        self.stages.get(stage.name()).unwrap_or(&self.default_policy)
    }

    /// Returns the overall deadline, if one is set.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Parses configuration from TOML and validates it.
    ///
    /// # Errors
    ///
    /// Returns a parse error or an invalid policy.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an override
    /// is malformed, or a policy is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for a malformed deadline.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_QINFRA_URL).filter(|v| !v.is_empty()) {
            self.endpoints.qinfra_url = url;
        }
        if let Some(url) = lookup(ENV_DROPS_URL).filter(|v| !v.is_empty()) {
            self.endpoints.drops_url = url;
        }
        if let Some(raw) = lookup(ENV_DEADLINE_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_DEADLINE_SECS.to_string(),
                value: raw.clone(),
            })?;
            self.deadline_ms = (secs > 0).then(|| secs.saturating_mul(1000));
        }
        Ok(())
    }

    /// Validates every policy.
    ///
    /// # Errors
    ///
    /// Returns the first invalid policy or unknown stage name found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_policy.validate("default")?;
        for (stage, policy) in &self.stages {
            if StageId::from_name(stage).is_none() {
                return Err(ConfigError::InvalidPolicy {
                    stage: stage.clone(),
                    reason: "unknown stage".to_string(),
                });
            }
            policy.validate(stage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BackoffStrategy;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.hardening_profile, "CIS");
        assert_eq!(config.sop_operations.len(), 5);
        assert_eq!(config.sop_operations[3], "disaster-recovery");
        assert!(config.deadline().is_none());
        assert_eq!(config.policy_for(StageId::Deployment), &StagePolicy::default());
    }

    #[test]
    fn test_stage_override() {
        let config = EngineConfig::for_tests()
            .with_stage_policy(StageId::Deployment, StagePolicy::immediate().with_max_attempts(1));

        assert_eq!(config.policy_for(StageId::Deployment).retry.max_attempts, 1);
        assert_eq!(config.policy_for(StageId::CodeAnalysis).retry.max_attempts, 3);
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            deadline_ms = 1800000
            hardening_profile = "STIG"

            [default_policy]
            timeout_ms = 120000

            [stages.deployment]
            timeout_ms = 900000
            retry = { max_attempts = 1, backoff = "constant" }
            "#,
        )
        .unwrap();

        assert_eq!(config.deadline(), Some(Duration::from_secs(1800)));
        assert_eq!(config.hardening_profile, "STIG");
        assert_eq!(config.default_policy.timeout_ms, 120_000);
        let deploy = config.policy_for(StageId::Deployment);
        assert_eq!(deploy.retry.max_attempts, 1);
        assert_eq!(deploy.retry.backoff, BackoffStrategy::Constant);
        assert_eq!(config.sop_operations.len(), 5);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let err = EngineConfig::from_toml_str(
            r#"
            [stages.code_analysis.retry]
            max_attempts = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("code_analysis"));
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let err = EngineConfig::from_toml_str("[stages.storage]\ntimeout_ms = 10\n").unwrap_err();
        assert!(err.to_string().contains("unknown stage"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_QINFRA_URL, "http://localhost:8095"),
            (ENV_DEADLINE_SECS, "600"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.endpoints.qinfra_url, "http://localhost:8095");
        assert!(config.endpoints.drops_url.contains("quantum-drops"));
        assert_eq!(config.deadline(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_sub_second_deadline_kept() {
        let config = EngineConfig::for_tests().with_deadline(Duration::from_millis(300));
        assert_eq!(config.deadline_ms, Some(300));
        assert_eq!(config.deadline(), Some(Duration::from_millis(300)));

        let config = EngineConfig::for_tests().with_deadline(Duration::from_millis(1500));
        assert_eq!(config.deadline(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_zero_deadline_env_disables() {
        let mut config = EngineConfig::for_tests().with_deadline(Duration::from_secs(30));
        config
            .apply_overrides(|key| (key == ENV_DEADLINE_SECS).then(|| "0".to_string()))
            .unwrap();
        assert!(config.deadline().is_none());
    }

    #[test]
    fn test_invalid_deadline_env() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_DEADLINE_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/infraflow.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("infraflow.toml");
        std::fs::write(&path, "hardening_profile = \"CIS-L2\"\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.hardening_profile, "CIS-L2");
    }
}
