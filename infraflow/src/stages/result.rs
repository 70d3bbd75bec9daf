//! Stage result types recorded by the executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::StageStatus;

/// Classification of why a stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// The collaborator returned an error.
    Collaborator,
    /// An attempt exceeded the per-attempt timeout.
    Timeout,
    /// The workflow was cancelled while the stage was running.
    Cancelled,
    /// The overall workflow deadline passed while the stage was running.
    DeadlineExceeded,
    /// A predecessor the stage depends on did not complete.
    Dependency,
    /// The stage output could not be serialized.
    Serialization,
}

impl StageErrorKind {
    /// Returns true if this failure terminates the workflow regardless of
    /// the stage's criticality.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collaborator => write!(f, "collaborator"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline_exceeded"),
            Self::Dependency => write!(f, "dependency"),
            Self::Serialization => write!(f, "serialization"),
        }
    }
}

/// Error detail attached to a failed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Failure classification.
    pub kind: StageErrorKind,
    /// Error message from the last attempt.
    pub message: String,
}

impl StageFailure {
    /// Creates a new stage failure.
    #[must_use]
    pub fn new(kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

/// The recorded outcome of one executed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name (e.g. "code_analysis").
    pub name: String,
    /// Stage status.
    pub status: StageStatus,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// When the last attempt ended.
    pub ended_at: DateTime<Utc>,
    /// Stage-specific output payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Error detail, present iff the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageFailure>,
    /// Number of attempts made.
    pub attempts: u32,
    /// Total elapsed time in milliseconds, including backoff.
    pub elapsed_ms: u64,
}

impl StageResult {
    /// Creates a completed stage result.
    #[must_use]
    pub fn completed(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        output: serde_json::Value,
    ) -> Self {
        let ended_at = Utc::now();
        Self {
            name: name.into(),
            status: StageStatus::Completed,
            started_at,
            ended_at,
            output: Some(output),
            error: None,
            attempts: 1,
            elapsed_ms: elapsed_between(started_at, ended_at),
        }
    }

    /// Creates a failed stage result.
    #[must_use]
    pub fn failed(name: impl Into<String>, started_at: DateTime<Utc>, error: StageFailure) -> Self {
        let ended_at = Utc::now();
        Self {
            name: name.into(),
            status: StageStatus::Failed,
            started_at,
            ended_at,
            output: None,
            error: Some(error),
            attempts: 1,
            elapsed_ms: elapsed_between(started_at, ended_at),
        }
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Returns the wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns the failure kind, if the stage failed.
    #[must_use]
    pub fn error_kind(&self) -> Option<StageErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

fn elapsed_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_result_completed() {
        let result = StageResult::completed(
            "code_analysis",
            Utc::now(),
            serde_json::json!({"language": "python"}),
        );

        assert_eq!(result.name, "code_analysis");
        assert!(result.is_success());
        assert!(result.error.is_none());
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_stage_result_failed() {
        let result = StageResult::failed(
            "deployment",
            Utc::now(),
            StageFailure::new(StageErrorKind::Timeout, "attempt exceeded 50ms"),
        )
        .with_attempts(3);

        assert!(result.is_failure());
        assert!(result.output.is_none());
        assert_eq!(result.attempts, 3);
        assert_eq!(result.error_kind(), Some(StageErrorKind::Timeout));
    }

    #[test]
    fn test_interrupt_kinds() {
        assert!(StageErrorKind::Cancelled.is_interrupt());
        assert!(StageErrorKind::DeadlineExceeded.is_interrupt());
        assert!(!StageErrorKind::Timeout.is_interrupt());
        assert!(!StageErrorKind::Collaborator.is_interrupt());
    }

    #[test]
    fn test_failure_display() {
        let failure = StageFailure::new(StageErrorKind::Collaborator, "connection refused");
        assert_eq!(failure.to_string(), "collaborator error: connection refused");
    }

    #[test]
    fn test_stage_result_serialization_omits_empty_fields() {
        let result = StageResult::completed("cost_estimation", Utc::now(), serde_json::json!(1));
        let json = serde_json::to_value(&result).unwrap();

        assert!(json.get("error").is_none());
        assert_eq!(json["status"], "completed");
    }
}
