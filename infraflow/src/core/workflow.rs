//! The workflow result returned to callers and persisted per workflow id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::WorkflowStatus;
use crate::collaborators::CostEstimate;
use crate::errors::ProvisionError;
use crate::stages::{Criticality, StageErrorKind, StageId, StageResult};

/// The failure that aborted or degraded a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFailure {
    /// Stage that failed.
    pub stage: String,
    /// Failure classification.
    pub kind: StageErrorKind,
    /// Underlying cause.
    pub message: String,
}

/// The accumulated result of a provisioning workflow.
///
/// Stage results are kept in execution order, which always equals the fixed
/// stage table order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Workflow identifier.
    pub workflow_id: String,
    /// Overall status.
    pub status: WorkflowStatus,
    /// When the workflow started.
    pub started_at: DateTime<Utc>,
    /// When the workflow reached its terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// End-to-end duration in milliseconds, set once at finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Executed stages, in execution order.
    #[serde(default)]
    pub stages: Vec<StageResult>,
    /// Generated infrastructure code (path to content).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_code: Option<BTreeMap<String, String>>,
    /// Promoted cost estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<CostEstimate>,
    /// Promoted deployment URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
    /// Summary message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The failure that aborted the workflow or failed the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<WorkflowFailure>,
}

impl WorkflowResult {
    /// Creates a result in the `started` state.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: WorkflowStatus::Started,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            stages: Vec::new(),
            infrastructure_code: None,
            estimated_cost: None,
            deployment_url: None,
            message: None,
            failure: None,
        }
    }

    /// Returns the result of a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the executed stage names in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the number of stages that completed.
    #[must_use]
    pub fn completed_stage_count(&self) -> usize {
        self.stages.iter().filter(|s| s.is_success()).count()
    }

    /// Returns true once the workflow has a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reconstructs the error propagated to the caller, if any.
    ///
    /// Recoverable stage failures are not errors at the workflow level and
    /// are only visible in the stage results.
    #[must_use]
    pub fn error(&self) -> Option<ProvisionError> {
        let failure = self.failure.as_ref()?;
        let stage = failure.stage.clone();
        let cause = failure.message.clone();

        let err = match (self.status, failure.kind) {
            (WorkflowStatus::DeploymentFailed, _) => ProvisionError::Deployment(cause),
            (_, StageErrorKind::Cancelled) => ProvisionError::Cancelled(cause),
            (_, StageErrorKind::DeadlineExceeded | StageErrorKind::Timeout) => {
                ProvisionError::Timeout { stage, message: cause }
            }
            _ => ProvisionError::FatalStage { stage, cause },
        };
        Some(err)
    }

    /// Returns one error per failed optional stage.
    ///
    /// These never abort the workflow and are not part of [`error`](Self::error).
    #[must_use]
    pub fn recoverable_errors(&self) -> Vec<ProvisionError> {
        self.stages
            .iter()
            .filter(|s| s.is_failure())
            .filter(|s| {
                StageId::from_name(&s.name)
                    .is_some_and(|id| id.definition().criticality == Criticality::Optional)
            })
            .map(|s| ProvisionError::RecoverableStage {
                stage: s.name.clone(),
                cause: s
                    .error
                    .as_ref()
                    .map_or_else(String::new, |e| e.message.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageFailure;

    #[test]
    fn test_new_result_is_started() {
        let result = WorkflowResult::new("wf-1");
        assert_eq!(result.status, WorkflowStatus::Started);
        assert!(result.stages.is_empty());
        assert!(result.duration_ms.is_none());
        assert!(!result.is_terminal());
        assert!(result.error().is_none());
    }

    #[test]
    fn test_stage_lookup_and_order() {
        let mut result = WorkflowResult::new("wf-1");
        result.stages.push(StageResult::completed("code_analysis", Utc::now(), serde_json::json!({})));
        result.stages.push(StageResult::failed(
            "infrastructure_generation",
            Utc::now(),
            StageFailure::new(StageErrorKind::Collaborator, "boom"),
        ));

        assert_eq!(result.stage_names(), vec!["code_analysis", "infrastructure_generation"]);
        assert!(result.stage("infrastructure_generation").unwrap().is_failure());
        assert_eq!(result.completed_stage_count(), 1);
    }

    #[test]
    fn test_error_reconstruction() {
        let mut result = WorkflowResult::new("wf-1");
        result.status = WorkflowStatus::Aborted;
        result.failure = Some(WorkflowFailure {
            stage: "code_analysis".to_string(),
            kind: StageErrorKind::Collaborator,
            message: "analyzer down".to_string(),
        });
        assert!(matches!(result.error(), Some(ProvisionError::FatalStage { .. })));

        result.failure.as_mut().unwrap().kind = StageErrorKind::Cancelled;
        assert!(matches!(result.error(), Some(ProvisionError::Cancelled(_))));

        result.status = WorkflowStatus::DeploymentFailed;
        result.failure.as_mut().unwrap().kind = StageErrorKind::Collaborator;
        assert!(matches!(result.error(), Some(ProvisionError::Deployment(_))));
    }
}
