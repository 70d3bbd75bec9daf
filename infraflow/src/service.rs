//! Engine entry point.
//!
//! [`ProvisioningService`] validates requests, makes sure only one run owns a
//! workflow id at a time, and hands the run to the orchestrator.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cancellation::CancellationToken;
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::core::{ProvisioningRequest, WorkflowResult};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::pipeline::WorkflowOrchestrator;

/// Removes a workflow from the in-flight set when its run ends.
struct InFlightGuard {
    active: Arc<DashMap<String, CancellationToken>>,
    workflow_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.remove(&self.workflow_id);
    }
}

enum Claim {
    Run(CancellationToken, InFlightGuard),
    Finished(WorkflowResult),
}

/// Starts, tracks and cancels provisioning workflows.
#[derive(Clone)]
pub struct ProvisioningService {
    orchestrator: WorkflowOrchestrator,
    active: Arc<DashMap<String, CancellationToken>>,
}

impl ProvisioningService {
    /// Wraps an orchestrator.
    #[must_use]
    pub fn new(orchestrator: WorkflowOrchestrator) -> Self {
        Self {
            orchestrator,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Builds a service with a default orchestrator.
    #[must_use]
    pub fn from_config(collaborators: Collaborators, config: EngineConfig) -> Self {
        Self::new(WorkflowOrchestrator::new(collaborators, config))
    }

    /// Returns the orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &WorkflowOrchestrator {
        &self.orchestrator
    }

    async fn claim(&self, request: &ProvisioningRequest) -> ProvisionResult<Claim> {
        request.validate()?;
        let workflow_id = request.workflow_id.clone();

        let token = CancellationToken::new();
        match self.active.entry(workflow_id.clone()) {
            Entry::Occupied(_) => return Err(ProvisionError::WorkflowInFlight(workflow_id)),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }
        let guard = InFlightGuard {
            active: self.active.clone(),
            workflow_id: workflow_id.clone(),
        };

        let store = self.orchestrator.store();
        match store.get(&workflow_id).await? {
            Some(existing) if existing.is_terminal() => {
                info!(workflow_id = %workflow_id, status = %existing.status, "Workflow already finished");
                return Ok(Claim::Finished(existing));
            }
            Some(_) => {
                warn!(workflow_id = %workflow_id, "Replacing unfinished workflow left by an earlier run");
            }
            None => store.create(&WorkflowResult::new(workflow_id.as_str())).await?,
        }

        Ok(Claim::Run(token, guard))
    }

    /// Runs a workflow to completion and returns its result.
    ///
    /// A workflow id that already reached a terminal status returns the
    /// stored result without running again.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Validation`] for an invalid request,
    /// [`ProvisionError::WorkflowInFlight`] if the id is already running, or a
    /// store error. Stage failures are reported in the result, not here.
    pub async fn start_provisioning(
        &self,
        request: ProvisioningRequest,
    ) -> ProvisionResult<WorkflowResult> {
        match self.claim(&request).await? {
            Claim::Finished(result) => Ok(result),
            Claim::Run(token, _guard) => Ok(self.orchestrator.run(&request, &token).await),
        }
    }

    /// Starts a workflow in the background and returns its id.
    ///
    /// # Errors
    ///
    /// Same as [`start_provisioning`](Self::start_provisioning), minus the run
    /// itself.
    pub async fn start(&self, request: ProvisioningRequest) -> ProvisionResult<String> {
        let workflow_id = request.workflow_id.clone();
        if let Claim::Run(token, guard) = self.claim(&request).await? {
            let orchestrator = self.orchestrator.clone();
            tokio::spawn(async move {
                let _guard = guard;
                orchestrator.run(&request, &token).await;
            });
        }
        Ok(workflow_id)
    }

    /// Returns the latest snapshot of a workflow, in progress or finished.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn get_result(&self, workflow_id: &str) -> ProvisionResult<Option<WorkflowResult>> {
        self.orchestrator.store().get(workflow_id).await
    }

    /// Cancels an in-flight workflow. Returns false if it is not running.
    pub fn cancel(&self, workflow_id: &str, reason: impl Into<String>) -> bool {
        let Some(token) = self.active.get(workflow_id).map(|t| t.value().clone()) else {
            return false;
        };
        let reason = reason.into();
        info!(workflow_id, reason = %reason, "Cancelling workflow");
        token.cancel(reason);
        true
    }

    /// Returns true if a run currently owns this workflow id.
    #[must_use]
    pub fn is_in_flight(&self, workflow_id: &str) -> bool {
        self.active.contains_key(workflow_id)
    }

    /// Returns the ids of all in-flight workflows.
    #[must_use]
    pub fn in_flight(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ProvisioningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningService")
            .field("in_flight", &self.active.len())
            .finish_non_exhaustive()
    }
}
