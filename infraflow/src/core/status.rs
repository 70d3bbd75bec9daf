//! Stage and workflow status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage is waiting to be executed.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Completed,
    /// Stage failed after exhausting its attempts.
    Failed,
    /// Stage was skipped.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// The overall status of a provisioning workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Workflow is in progress.
    #[default]
    Started,
    /// Every executed stage was handled and no fatal failure occurred.
    Completed,
    /// All prior stages finished but the deploy stage failed.
    DeploymentFailed,
    /// A required stage failed, or the workflow was cancelled or timed out.
    Aborted,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Completed => write!(f, "completed"),
            Self::DeploymentFailed => write!(f, "deployment_failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl WorkflowStatus {
    /// Returns true once the workflow has reached a final status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Completed.to_string(), "completed");
        assert_eq!(StageStatus::Failed.to_string(), "failed");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_stage_status_is_terminal() {
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }

    #[test]
    fn test_workflow_status_terminal() {
        assert!(!WorkflowStatus::Started.is_terminal());
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::DeploymentFailed.is_terminal());
        assert!(WorkflowStatus::Aborted.is_terminal());
    }

    #[test]
    fn test_workflow_status_serialize() {
        let json = serde_json::to_string(&WorkflowStatus::DeploymentFailed).unwrap();
        assert_eq!(json, r#""deployment_failed""#);

        let status: WorkflowStatus = serde_json::from_str(r#""aborted""#).unwrap();
        assert_eq!(status, WorkflowStatus::Aborted);
    }
}
