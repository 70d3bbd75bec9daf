//! Failure policy: maps a stage outcome to what the workflow does next.

use serde::{Deserialize, Serialize};

use crate::stages::{Criticality, StageDefinition, StageResult};

/// What the orchestrator does after a stage finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Stop the workflow with status `aborted`.
    Abort,
    /// Record the failure and move on.
    ContinueWithWarning,
    /// Keep the output and promote any aggregate fields.
    Promote,
    /// The deploy stage failed; earlier results stand.
    DeploymentFailed,
}

/// Decides the workflow's next step from a stage definition and its result.
///
/// Cancellation and deadline failures abort regardless of criticality.
#[must_use]
pub fn decide(definition: &StageDefinition, result: &StageResult) -> Decision {
    if result.is_success() {
        return Decision::Promote;
    }

    if result.error_kind().is_some_and(|kind| kind.is_interrupt()) {
        return Decision::Abort;
    }

    match definition.criticality {
        Criticality::Required => Decision::Abort,
        Criticality::Optional => Decision::ContinueWithWarning,
        Criticality::Terminal => Decision::DeploymentFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{StageErrorKind, StageFailure, StageId};
    use chrono::Utc;

    fn failed(id: StageId, kind: StageErrorKind) -> StageResult {
        StageResult::failed(id.name(), Utc::now(), StageFailure::new(kind, "boom"))
    }

    #[test]
    fn test_completed_promotes() {
        for id in StageId::ALL {
            let result = StageResult::completed(id.name(), Utc::now(), serde_json::json!({}));
            assert_eq!(decide(id.definition(), &result), Decision::Promote);
        }
    }

    #[test]
    fn test_failure_by_criticality() {
        let collaborator = StageErrorKind::Collaborator;
        assert_eq!(
            decide(
                StageId::CodeAnalysis.definition(),
                &failed(StageId::CodeAnalysis, collaborator)
            ),
            Decision::Abort
        );
        assert_eq!(
            decide(
                StageId::GoldenImages.definition(),
                &failed(StageId::GoldenImages, StageErrorKind::Timeout)
            ),
            Decision::ContinueWithWarning
        );
        assert_eq!(
            decide(
                StageId::Deployment.definition(),
                &failed(StageId::Deployment, collaborator)
            ),
            Decision::DeploymentFailed
        );
    }

    #[test]
    fn test_interrupts_always_abort() {
        for kind in [StageErrorKind::Cancelled, StageErrorKind::DeadlineExceeded] {
            for id in [StageId::CostEstimation, StageId::ArtifactStorage, StageId::Deployment] {
                assert_eq!(decide(id.definition(), &failed(id, kind)), Decision::Abort);
            }
        }
    }
}
