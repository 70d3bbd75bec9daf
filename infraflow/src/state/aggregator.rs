//! Append-only accumulation of one workflow's results.
//!
//! The aggregator is owned by the single run processing a workflow id. Each
//! mutation is written through to the [`WorkflowStore`] so progress can be
//! observed while the run is in flight. Store failures are logged and do not
//! interrupt the run.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use super::WorkflowStore;
use crate::collaborators::CostEstimate;
use crate::core::{WorkflowFailure, WorkflowResult, WorkflowStatus};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::stages::StageResult;

/// Builds a [`WorkflowResult`] stage by stage.
pub struct ResultAggregator {
    result: WorkflowResult,
    store: Arc<dyn WorkflowStore>,
}

impl ResultAggregator {
    /// Starts a workflow in the `started` state and persists it.
    ///
    /// A stored non-terminal snapshot is replaced. A store read failure is
    /// logged and the start proceeds.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::AlreadyFinalized`] if the store already
    /// holds a terminal result for this id; the stored result is left as is.
    pub async fn start(
        workflow_id: impl Into<String>,
        store: Arc<dyn WorkflowStore>,
    ) -> ProvisionResult<Self> {
        let workflow_id = workflow_id.into();
        match store.get(&workflow_id).await {
            Ok(Some(existing)) if existing.is_terminal() => {
                return Err(ProvisionError::AlreadyFinalized(workflow_id));
            }
            Ok(_) => {}
            Err(e) => warn!(%workflow_id, error = %e, "Failed to read stored workflow"),
        }

        let aggregator = Self {
            result: WorkflowResult::new(workflow_id),
            store,
        };
        aggregator.persist().await;
        Ok(aggregator)
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &WorkflowResult {
        &self.result
    }

    /// Returns the workflow id.
    #[must_use]
    pub fn workflow_id(&self) -> &str {
        &self.result.workflow_id
    }

    /// Returns true once a stage with this name has been recorded.
    #[must_use]
    pub fn has_stage(&self, name: &str) -> bool {
        self.result.stage(name).is_some()
    }

    /// Returns true if the named stage was recorded as completed.
    #[must_use]
    pub fn stage_completed(&self, name: &str) -> bool {
        self.result.stage(name).is_some_and(StageResult::is_success)
    }

    fn ensure_open(&self) -> ProvisionResult<()> {
        if self.result.is_terminal() {
            return Err(ProvisionError::AlreadyFinalized(self.result.workflow_id.clone()));
        }
        Ok(())
    }

    /// Appends a stage result.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is finalized or the stage was already recorded.
    pub async fn record_stage(&mut self, stage: StageResult) -> ProvisionResult<()> {
        self.ensure_open()?;
        if self.has_stage(&stage.name) {
            return Err(ProvisionError::StageAlreadyRecorded {
                workflow_id: self.result.workflow_id.clone(),
                stage: stage.name,
            });
        }
        self.result.stages.push(stage);
        self.persist().await;
        Ok(())
    }

    /// Promotes the generated infrastructure code.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is finalized.
    pub fn promote_infrastructure_code(
        &mut self,
        code: BTreeMap<String, String>,
    ) -> ProvisionResult<()> {
        self.ensure_open()?;
        self.result.infrastructure_code = Some(code);
        Ok(())
    }

    /// Promotes the cost estimate.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is finalized.
    pub fn promote_cost_estimate(&mut self, estimate: CostEstimate) -> ProvisionResult<()> {
        self.ensure_open()?;
        self.result.estimated_cost = Some(estimate);
        Ok(())
    }

    /// Promotes the deployment URL.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is finalized.
    pub fn promote_deployment_url(&mut self, url: impl Into<String>) -> ProvisionResult<()> {
        self.ensure_open()?;
        self.result.deployment_url = Some(url.into());
        Ok(())
    }

    /// Records the failure that aborted or degraded the workflow.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is finalized.
    pub fn set_failure(&mut self, failure: WorkflowFailure) -> ProvisionResult<()> {
        self.ensure_open()?;
        self.result.failure = Some(failure);
        Ok(())
    }

    /// Writes the terminal status, end time, duration and message.
    ///
    /// # Errors
    ///
    /// Fails with [`ProvisionError::AlreadyFinalized`] on a second call and
    /// with [`ProvisionError::Validation`] for a non-terminal status.
    pub async fn finalize(
        &mut self,
        status: WorkflowStatus,
        message: impl Into<String>,
    ) -> ProvisionResult<&WorkflowResult> {
        self.ensure_open()?;
        if !status.is_terminal() {
            return Err(ProvisionError::Validation(format!(
                "cannot finalize with non-terminal status '{status}'"
            )));
        }

        let ended_at = Utc::now();
        let duration = (ended_at - self.result.started_at).num_milliseconds();
        self.result.ended_at = Some(ended_at);
        self.result.duration_ms = Some(u64::try_from(duration).unwrap_or(0));
        self.result.message = Some(message.into());
        self.result.status = status;

        self.persist().await;
        Ok(&self.result)
    }

    /// Consumes the aggregator and returns the result.
    #[must_use]
    pub fn into_result(self) -> WorkflowResult {
        self.result
    }

    async fn persist(&self) {
        if let Err(e) = self.store.put(&self.result).await {
            warn!(
                workflow_id = %self.result.workflow_id,
                error = %e,
                "Failed to persist workflow snapshot"
            );
        }
    }
}

impl std::fmt::Debug for ResultAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultAggregator")
            .field("workflow_id", &self.result.workflow_id)
            .field("status", &self.result.status)
            .field("stages", &self.result.stages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryWorkflowStore;
    use crate::stages::{StageErrorKind, StageFailure};

    async fn aggregator() -> (ResultAggregator, Arc<InMemoryWorkflowStore>) {
        let store = Arc::new(InMemoryWorkflowStore::new());
        (ResultAggregator::start("wf-agg", store.clone()).await.unwrap(), store)
    }

    fn completed(name: &str) -> StageResult {
        StageResult::completed(name, Utc::now(), serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_start_persists_started_snapshot() {
        let (_agg, store) = aggregator().await;
        let stored = store.get("wf-agg").await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::Started);
    }

    #[tokio::test]
    async fn test_record_in_order_and_write_through() {
        let (mut agg, store) = aggregator().await;
        agg.record_stage(completed("code_analysis")).await.unwrap();
        agg.record_stage(completed("infrastructure_generation")).await.unwrap();

        let stored = store.get("wf-agg").await.unwrap().unwrap();
        assert_eq!(stored.stage_names(), vec!["code_analysis", "infrastructure_generation"]);
        assert!(agg.stage_completed("code_analysis"));
        assert!(!agg.stage_completed("deployment"));
    }

    #[tokio::test]
    async fn test_duplicate_stage_rejected() {
        let (mut agg, _) = aggregator().await;
        agg.record_stage(completed("code_analysis")).await.unwrap();

        let err = agg.record_stage(completed("code_analysis")).await.unwrap_err();
        assert!(matches!(err, ProvisionError::StageAlreadyRecorded { .. }));
        assert_eq!(agg.snapshot().stages.len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_once() {
        let (mut agg, store) = aggregator().await;
        agg.record_stage(completed("code_analysis")).await.unwrap();

        let result = agg.finalize(WorkflowStatus::Completed, "done").await.unwrap();
        let ended = result.ended_at.unwrap();
        assert_eq!(
            result.duration_ms,
            Some(u64::try_from((ended - result.started_at).num_milliseconds()).unwrap())
        );

        assert!(matches!(
            agg.finalize(WorkflowStatus::Aborted, "again").await,
            Err(ProvisionError::AlreadyFinalized(_))
        ));
        assert!(agg.record_stage(completed("cost_estimation")).await.is_err());
        assert!(agg.promote_deployment_url("https://x").is_err());

        let stored = store.get("wf-agg").await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::Completed);
        assert_eq!(stored.message.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_finalize_rejects_non_terminal() {
        let (mut agg, _) = aggregator().await;
        assert!(matches!(
            agg.finalize(WorkflowStatus::Started, "nope").await,
            Err(ProvisionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_and_promotions() {
        let (mut agg, _) = aggregator().await;
        agg.promote_cost_estimate(CostEstimate::from_monthly(720.0)).unwrap();
        agg.set_failure(WorkflowFailure {
            stage: "deployment".to_string(),
            kind: StageErrorKind::Collaborator,
            message: StageFailure::new(StageErrorKind::Collaborator, "apply failed").message,
        })
        .unwrap();
        agg.finalize(WorkflowStatus::DeploymentFailed, "deploy failed").await.unwrap();

        let result = agg.into_result();
        assert_eq!(result.estimated_cost.as_ref().unwrap().hourly, 1.0);
        assert!(matches!(result.error(), Some(ProvisionError::Deployment(_))));
    }

    #[tokio::test]
    async fn test_start_refuses_terminal_stored_result() {
        let (mut agg, store) = aggregator().await;
        agg.record_stage(completed("code_analysis")).await.unwrap();
        agg.finalize(WorkflowStatus::Completed, "done").await.unwrap();

        let err = ResultAggregator::start("wf-agg", store.clone()).await.err();
        assert!(matches!(err, Some(ProvisionError::AlreadyFinalized(id)) if id == "wf-agg"));

        let stored = store.get("wf-agg").await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::Completed);
        assert_eq!(stored.stages.len(), 1);
    }

    #[tokio::test]
    async fn test_start_replaces_unfinished_snapshot() {
        let (mut agg, store) = aggregator().await;
        agg.record_stage(completed("code_analysis")).await.unwrap();

        let restarted = ResultAggregator::start("wf-agg", store.clone()).await.unwrap();
        assert!(restarted.snapshot().stages.is_empty());

        let stored = store.get("wf-agg").await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::Started);
        assert!(stored.stages.is_empty());
    }
}
