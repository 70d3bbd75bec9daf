//! Workflow orchestrator.
//!
//! Walks [`STAGE_TABLE`] once, in order. For each stage it evaluates the
//! feature gate, checks that required predecessors completed, runs the
//! collaborator call through the executor, asks the failure policy what to
//! do, and records the outcome in the aggregator. Stages run sequentially.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::executor::{self, check_interrupt, StageExecution};
use super::policy::{decide, Decision};
use crate::cancellation::CancellationToken;
use crate::collaborators::{
    ArtifactDrop, CodeAnalysis, CodeAnalysisRequest, Collaborators, ComplianceRequest, CostEstimate,
    CostRequest, DeployRequest, DeploymentResult, GenerateInfraRequest, GoldenImageRequest,
    InfrastructureCode, SopRequest,
};
use crate::config::EngineConfig;
use crate::errors::ProvisionError;
use crate::core::{ProvisioningRequest, WorkflowFailure, WorkflowResult, WorkflowStatus};
use crate::events::{self, EventSink, LoggingEventSink, WorkflowEvent};
use crate::stages::{
    StageDefinition, StageErrorKind, StageFailure, StageId, StageResult, STAGE_TABLE,
};
use crate::state::{InMemoryWorkflowStore, ResultAggregator, WorkflowStore};

/// Drop stage label for generated infrastructure code.
pub const INFRASTRUCTURE_DROP_STAGE: &str = "infrastructure";
/// Drop type for generated infrastructure code.
pub const INFRASTRUCTURE_DROP_TYPE: &str = "infrastructure_code";

/// Typed outputs later stages consume or the result promotes.
enum Captured {
    Nothing,
    Analysis(CodeAnalysis),
    Infrastructure(InfrastructureCode),
    Cost(CostEstimate),
    Deployment(DeploymentResult),
}

fn split<T>(execution: StageExecution<T>, wrap: fn(T) -> Captured) -> (StageResult, Captured) {
    let captured = execution.output.map_or(Captured::Nothing, wrap);
    (execution.result, captured)
}

fn discard<T>(execution: StageExecution<T>) -> (StageResult, Captured) {
    (execution.result, Captured::Nothing)
}

/// Outputs of completed required stages.
#[derive(Default)]
struct RunContext {
    analysis: Option<CodeAnalysis>,
    infrastructure: Option<InfrastructureCode>,
}

/// Drives a provisioning request through the stage table.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    collaborators: Collaborators,
    config: Arc<EngineConfig>,
    event_sink: Arc<dyn EventSink>,
    store: Arc<dyn WorkflowStore>,
}

impl WorkflowOrchestrator {
    /// Creates an orchestrator with an in-memory store, logging events at
    /// debug level.
    #[must_use]
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            collaborators,
            config: Arc::new(config),
            event_sink: Arc::new(LoggingEventSink),
            store: Arc::new(InMemoryWorkflowStore::new()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the workflow store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = store;
        self
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the workflow store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Runs a workflow to a terminal status.
    ///
    /// Always returns the workflow result; an aborted or degraded run carries
    /// its cause in [`WorkflowResult::failure`] and [`WorkflowResult::error`].
    /// The request is assumed to be validated. If the store already holds a
    /// terminal result for the id, that result is returned and no stage runs.
    pub async fn run(
        &self,
        request: &ProvisioningRequest,
        cancellation: &CancellationToken,
    ) -> WorkflowResult {
        let workflow_id = request.workflow_id.as_str();
        let run_id = Uuid::now_v7();
        let deadline = self.config.deadline().map(|d| Instant::now() + d);

        let mut aggregator = match ResultAggregator::start(workflow_id, self.store.clone()).await {
            Ok(aggregator) => aggregator,
            Err(e) => {
                warn!(workflow_id, error = %e, "Workflow already finalized, not rerunning");
                return self.finalized_result(workflow_id, &e).await;
            }
        };
        let mut context = RunContext::default();
        let mut status = WorkflowStatus::Completed;

        info!(
            workflow_id,
            %run_id,
            provider = %request.provider,
            environment = %request.environment,
            "Starting provisioning workflow"
        );
        self.event_sink
            .emit(WorkflowEvent::workflow(
                events::WORKFLOW_STARTED,
                workflow_id,
                json!({
                    "run_id": run_id.to_string(),
                    "provider": request.provider,
                    "environment": request.environment,
                }),
            ))
            .await;

        for definition in &STAGE_TABLE {
            let stage = definition.name();

            if !definition.gate.is_open(request) {
                debug!(workflow_id, stage, "Stage disabled by request");
                self.event_sink
                    .emit(WorkflowEvent::stage(
                        events::STAGE_GATED,
                        workflow_id,
                        stage,
                        Value::Null,
                    ))
                    .await;
                continue;
            }

            if let Some(failure) = check_interrupt(cancellation, deadline) {
                error!(workflow_id, stage, error = %failure, "Workflow interrupted");
                Self::record_failure(&mut aggregator, stage, &failure);
                status = WorkflowStatus::Aborted;
                break;
            }

            info!(workflow_id, stage, "Executing stage");
            self.event_sink
                .emit(WorkflowEvent::stage(
                    events::STAGE_STARTED,
                    workflow_id,
                    stage,
                    Value::Null,
                ))
                .await;

            let (result, captured) = match Self::missing_dependency(definition, &aggregator) {
                Some(failure) => (
                    StageResult::failed(stage, chrono::Utc::now(), failure).with_attempts(0),
                    Captured::Nothing,
                ),
                None => {
                    self.dispatch(definition.id, request, &context, cancellation, deadline)
                        .await
                }
            };

            let decision = decide(definition, &result);
            match decision {
                Decision::Promote => {
                    info!(
                        workflow_id,
                        stage,
                        attempts = result.attempts,
                        elapsed_ms = result.elapsed_ms,
                        "Stage completed"
                    );
                    Self::promote(&mut aggregator, &mut context, captured);
                    self.event_sink
                        .emit(stage_event(events::STAGE_COMPLETED, workflow_id, stage, &result))
                        .await;
                }
                Decision::ContinueWithWarning => {
                    warn!(
                        workflow_id,
                        stage,
                        attempts = result.attempts,
                        error = ?result.error,
                        "Optional stage failed, continuing"
                    );
                    self.event_sink
                        .emit(stage_event(events::STAGE_FAILED, workflow_id, stage, &result))
                        .await;
                }
                Decision::DeploymentFailed | Decision::Abort => {
                    error!(
                        workflow_id,
                        stage,
                        attempts = result.attempts,
                        error = ?result.error,
                        "Stage failed"
                    );
                    if let Some(failure) = &result.error {
                        Self::record_failure(&mut aggregator, stage, failure);
                    }
                    status = if decision == Decision::Abort {
                        WorkflowStatus::Aborted
                    } else {
                        WorkflowStatus::DeploymentFailed
                    };
                    self.event_sink
                        .emit(stage_event(events::STAGE_FAILED, workflow_id, stage, &result))
                        .await;
                }
            }

            if let Err(e) = aggregator.record_stage(result).await {
                error!(workflow_id, stage, error = %e, "Failed to record stage result");
            }

            if status == WorkflowStatus::Aborted {
                break;
            }
        }

        let message = summary_message(request, status, aggregator.snapshot());
        if let Err(e) = aggregator.finalize(status, message).await {
            error!(workflow_id, error = %e, "Failed to finalize workflow");
        }

        let result = aggregator.into_result();
        let event_type = match result.status {
            WorkflowStatus::Completed => events::WORKFLOW_COMPLETED,
            WorkflowStatus::DeploymentFailed => events::WORKFLOW_DEPLOYMENT_FAILED,
            WorkflowStatus::Aborted | WorkflowStatus::Started => events::WORKFLOW_ABORTED,
        };
        info!(
            workflow_id,
            status = %result.status,
            duration_ms = result.duration_ms.unwrap_or_default(),
            stages = result.stages.len(),
            "Provisioning workflow finished"
        );
        self.event_sink
            .emit(WorkflowEvent::workflow(
                event_type,
                workflow_id,
                json!({
                    "run_id": run_id.to_string(),
                    "status": result.status,
                    "duration_ms": result.duration_ms,
                    "message": result.message,
                }),
            ))
            .await;

        result
    }

    async fn finalized_result(&self, workflow_id: &str, cause: &ProvisionError) -> WorkflowResult {
        match self.store.get(workflow_id).await {
            Ok(Some(result)) => result,
            _ => {
                let mut result = WorkflowResult::new(workflow_id);
                result.status = WorkflowStatus::Aborted;
                result.message = Some(cause.to_string());
                result
            }
        }
    }

    fn missing_dependency(
        definition: &StageDefinition,
        aggregator: &ResultAggregator,
    ) -> Option<StageFailure> {
        definition
            .depends_on
            .iter()
            .find(|dep| !aggregator.stage_completed(dep.name()))
            .map(|dep| {
                StageFailure::new(
                    StageErrorKind::Dependency,
                    format!("required stage '{dep}' did not complete"),
                )
            })
    }

    fn record_failure(aggregator: &mut ResultAggregator, stage: &str, failure: &StageFailure) {
        let recorded = aggregator.set_failure(WorkflowFailure {
            stage: stage.to_string(),
            kind: failure.kind,
            message: failure.message.clone(),
        });
        if let Err(e) = recorded {
            error!(workflow_id = %aggregator.workflow_id(), stage, error = %e, "Failed to record workflow failure");
        }
    }

    fn promote(aggregator: &mut ResultAggregator, context: &mut RunContext, captured: Captured) {
        let promoted = match captured {
            Captured::Nothing => Ok(()),
            Captured::Analysis(analysis) => {
                context.analysis = Some(analysis);
                Ok(())
            }
            Captured::Infrastructure(code) => {
                let promoted = aggregator.promote_infrastructure_code(code.code.clone());
                context.infrastructure = Some(code);
                promoted
            }
            Captured::Cost(estimate) => aggregator.promote_cost_estimate(estimate),
            Captured::Deployment(deployment) => aggregator.promote_deployment_url(deployment.url),
        };
        if let Err(e) = promoted {
            error!(workflow_id = %aggregator.workflow_id(), error = %e, "Failed to promote stage output");
        }
    }

    async fn dispatch(
        &self,
        stage: StageId,
        request: &ProvisioningRequest,
        context: &RunContext,
        cancellation: &CancellationToken,
        deadline: Option<Instant>,
    ) -> (StageResult, Captured) {
        let name = stage.name();
        let policy = self.config.policy_for(stage);
        let c = &self.collaborators;

        match stage {
            StageId::CodeAnalysis => {
                let call = CodeAnalysisRequest {
                    workflow_id: request.workflow_id.clone(),
                    provider: request.provider.clone(),
                };
                let execution = executor::execute(name, policy, cancellation, deadline, || {
                    c.analyzer.analyze(&call)
                })
                .await;
                split(execution, Captured::Analysis)
            }
            StageId::InfrastructureGeneration => {
                let Some(analysis) = context.analysis.as_ref() else {
                    return unmet(name, StageId::CodeAnalysis);
                };
                let call = GenerateInfraRequest {
                    workflow_id: request.workflow_id.clone(),
                    provider: request.provider.clone(),
                    resources: analysis.required_resources.clone(),
                    compliance: request.compliance_list(),
                    environment: request.environment.clone(),
                    requirements: analysis.requirements.clone(),
                };
                let execution = executor::execute(name, policy, cancellation, deadline, || {
                    c.generator.generate(&call)
                })
                .await;
                split(execution, Captured::Infrastructure)
            }
            StageId::GoldenImages => {
                let Some(analysis) = context.analysis.as_ref() else {
                    return unmet(name, StageId::CodeAnalysis);
                };
                let call = GoldenImageRequest {
                    base_os: analysis.recommended_os.clone(),
                    packages: analysis.required_packages.clone(),
                    hardening: self.config.hardening_profile.clone(),
                    compliance: request.compliance_list(),
                };
                let execution = executor::execute(name, policy, cancellation, deadline, || {
                    c.image_builder.build(&call)
                })
                .await;
                discard(execution)
            }
            StageId::SopGeneration => {
                let Some(infrastructure) = context.infrastructure.as_ref() else {
                    return unmet(name, StageId::InfrastructureGeneration);
                };
                let call = SopRequest {
                    infrastructure_type: infrastructure.framework.clone(),
                    operations: self.config.sop_operations.clone(),
                };
                let execution = executor::execute(name, policy, cancellation, deadline, || {
                    c.sop_generator.generate_sops(&call)
                })
                .await;
                discard(execution)
            }
            StageId::ComplianceValidation => {
                let Some(infrastructure) = context.infrastructure.as_ref() else {
                    return unmet(name, StageId::InfrastructureGeneration);
                };
                let call = ComplianceRequest {
                    code: infrastructure.code.clone(),
                    frameworks: request.compliance_list(),
                };
                let execution = executor::execute(name, policy, cancellation, deadline, || {
                    c.compliance.validate(&call)
                })
                .await;
                discard(execution)
            }
            StageId::CostEstimation => {
                let Some(analysis) = context.analysis.as_ref() else {
                    return unmet(name, StageId::CodeAnalysis);
                };
                let call = CostRequest {
                    provider: request.provider.clone(),
                    resources: analysis.required_resources.clone(),
                };
                let execution = executor::execute(name, policy, cancellation, deadline, || {
                    c.cost_estimator.estimate(&call)
                })
                .await;
                split(execution, Captured::Cost)
            }
            StageId::ArtifactStorage => {
                let Some(infrastructure) = context.infrastructure.as_ref() else {
                    return unmet(name, StageId::InfrastructureGeneration);
                };
                let artifact: Value = match serde_json::to_value(infrastructure) {
                    Ok(value) => value,
                    Err(e) => {
                        let failure = StageFailure::new(StageErrorKind::Serialization, e.to_string());
                        return (
                            StageResult::failed(name, chrono::Utc::now(), failure).with_attempts(0),
                            Captured::Nothing,
                        );
                    }
                };
                let call = ArtifactDrop {
                    workflow_id: request.workflow_id.clone(),
                    stage: INFRASTRUCTURE_DROP_STAGE.to_string(),
                    drop_type: INFRASTRUCTURE_DROP_TYPE.to_string(),
                    artifact,
                };
                let execution = executor::execute(name, policy, cancellation, deadline, || {
                    c.artifact_store.store(&call)
                })
                .await;
                discard(execution)
            }
            StageId::Deployment => {
                let Some(infrastructure) = context.infrastructure.as_ref() else {
                    return unmet(name, StageId::InfrastructureGeneration);
                };
                let call = DeployRequest {
                    workflow_id: request.workflow_id.clone(),
                    provider: request.provider.clone(),
                    environment: request.environment.clone(),
                    code: infrastructure.code.clone(),
                    dry_run: request.dry_run,
                };
                let execution = executor::execute(name, policy, cancellation, deadline, || {
                    c.deployer.deploy(&call)
                })
                .await;
                split(execution, Captured::Deployment)
            }
        }
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("collaborators", &self.collaborators)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn unmet(stage: &str, dependency: StageId) -> (StageResult, Captured) {
    let failure = StageFailure::new(
        StageErrorKind::Dependency,
        format!("output of '{dependency}' is not available"),
    );
    (
        StageResult::failed(stage, chrono::Utc::now(), failure).with_attempts(0),
        Captured::Nothing,
    )
}

fn stage_event(
    event_type: &'static str,
    workflow_id: &str,
    stage: &'static str,
    result: &StageResult,
) -> WorkflowEvent {
    let data = json!({
        "status": result.status,
        "attempts": result.attempts,
        "elapsed_ms": result.elapsed_ms,
        "error": result.error,
    });
    WorkflowEvent::stage(event_type, workflow_id, stage, data)
}

fn summary_message(
    request: &ProvisioningRequest,
    status: WorkflowStatus,
    result: &WorkflowResult,
) -> String {
    match status {
        WorkflowStatus::Completed => {
            let failed: Vec<&str> = result
                .stages
                .iter()
                .filter(|s| s.is_failure())
                .map(|s| s.name.as_str())
                .collect();
            if failed.is_empty() {
                format!("Infrastructure generated successfully for {}", request.provider)
            } else {
                format!(
                    "Infrastructure generated for {} with failed optional stages: {}",
                    request.provider,
                    failed.join(", ")
                )
            }
        }
        WorkflowStatus::DeploymentFailed => format!(
            "Infrastructure generated for {} but deployment failed",
            request.provider
        ),
        WorkflowStatus::Aborted | WorkflowStatus::Started => match &result.failure {
            Some(failure) => format!(
                "Workflow aborted at stage '{}': {}",
                failure.stage, failure.message
            ),
            None => "Workflow aborted".to_string(),
        },
    }
}
