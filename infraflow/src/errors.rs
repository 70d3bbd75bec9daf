//! Error types for the provisioning engine.
//!
//! [`ProvisionError`] is the workflow-level taxonomy surfaced to callers.
//! [`CollaboratorError`] is what an external capability returns from a
//! single call; the stage executor turns those into stage failures and the
//! orchestrator decides whether they are fatal.

use thiserror::Error;

/// Result type alias for engine operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// The main error type for provisioning operations.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A required stage exhausted its attempts.
    #[error("Required stage '{stage}' failed: {cause}")]
    FatalStage {
        /// The stage that failed.
        stage: String,
        /// The underlying cause.
        cause: String,
    },

    /// An optional stage exhausted its attempts. Never aborts a workflow.
    #[error("Optional stage '{stage}' failed: {cause}")]
    RecoverableStage {
        /// The stage that failed.
        stage: String,
        /// The underlying cause.
        cause: String,
    },

    /// An attempt or the overall workflow deadline timed out.
    #[error("Stage '{stage}' timed out: {message}")]
    Timeout {
        /// The stage that was running.
        stage: String,
        /// Timeout detail.
        message: String,
    },

    /// The workflow was cancelled.
    #[error("Workflow cancelled: {0}")]
    Cancelled(String),

    /// The deploy stage failed; earlier stages remain valid.
    #[error("Deployment failed: {0}")]
    Deployment(String),

    /// The request failed validation.
    #[error("Invalid provisioning request: {0}")]
    Validation(String),

    /// A run for this workflow id is already in progress.
    #[error("Workflow '{0}' is already in flight")]
    WorkflowInFlight(String),

    /// The workflow already has a terminal status.
    #[error("Workflow '{0}' has already been finalized")]
    AlreadyFinalized(String),

    /// A result for this stage was already recorded.
    #[error("Stage '{stage}' already recorded for workflow '{workflow_id}'")]
    StageAlreadyRecorded {
        /// The workflow id.
        workflow_id: String,
        /// The stage name.
        stage: String,
    },

    /// The workflow store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Returns true if this error terminated a workflow.
    #[must_use]
    pub fn is_workflow_terminal(&self) -> bool {
        matches!(
            self,
            Self::FatalStage { .. } | Self::Timeout { .. } | Self::Cancelled(_)
        )
    }
}

/// Errors returned by an external collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The service is temporarily unavailable (retryable).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The request could not be delivered (retryable).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service rejected the request (not retryable).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The service answered with something unusable (not retryable).
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CollaboratorError {
    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a rejected error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Returns true if another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Transport(_))
    }
}

/// Errors raised while loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        /// The file path.
        path: String,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override had an invalid value.
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv {
        /// The environment variable.
        key: String,
        /// The offending value.
        value: String,
    },

    /// A policy value is out of range.
    #[error("Invalid policy for stage '{stage}': {reason}")]
    InvalidPolicy {
        /// The stage name (or "default").
        stage: String,
        /// What is wrong.
        reason: String,
    },
}
