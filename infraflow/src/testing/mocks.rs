//! Scripted collaborators for tests and benchmarks.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::fixtures;
use crate::collaborators::{
    ArtifactDrop, ArtifactStore, CodeAnalysis, CodeAnalysisRequest, CodeAnalyzer,
    CollaboratorResult, Collaborators, ComplianceRequest, ComplianceResult, ComplianceValidator,
    CostEstimate, CostEstimator, CostRequest, DeployRequest, Deployer, DeploymentResult,
    DropReceipt, GenerateInfraRequest, GoldenImageRequest, GoldenImageResult, ImageBuilder,
    InfraCodeGenerator, InfrastructureCode, SopGenerator, SopRequest, SopResult,
};
use crate::errors::CollaboratorError;
use crate::stages::StageId;

/// How a mocked capability answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Return the canned output.
    Succeed,
    /// Fail the first `n` calls, then succeed.
    FailTimes(u32, CollaboratorError),
    /// Fail every call.
    FailAlways(CollaboratorError),
    /// Sleep, then return the canned output.
    Delay(Duration),
    /// Never answer.
    Hang,
}

impl Behavior {
    /// Fails every call with a retryable error.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::FailAlways(CollaboratorError::unavailable("service unavailable"))
    }

    /// Fails every call with a non-retryable error.
    #[must_use]
    pub fn rejected() -> Self {
        Self::FailAlways(CollaboratorError::rejected("request rejected"))
    }

    /// Fails the first `n` calls with a retryable error.
    #[must_use]
    pub fn flaky(n: u32) -> Self {
        Self::FailTimes(n, CollaboratorError::transport("connection reset"))
    }
}

/// One mock implementing every collaborator capability.
///
/// Each capability is keyed by the stage that calls it. Behaviour defaults
/// to [`Behavior::Succeed`] with the outputs from [`fixtures`].
#[derive(Debug, Default)]
pub struct MockCollaborators {
    behaviors: Mutex<HashMap<StageId, Behavior>>,
    calls: Mutex<HashMap<StageId, u32>>,
    requests: Mutex<Vec<(StageId, serde_json::Value)>>,
}

impl MockCollaborators {
    /// Creates a mock where every capability succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the behaviour of the capability behind a stage.
    #[must_use]
    pub fn with(self, stage: StageId, behavior: Behavior) -> Self {
        self.set(stage, behavior);
        self
    }

    /// Changes the behaviour of the capability behind a stage.
    pub fn set(&self, stage: StageId, behavior: Behavior) {
        self.behaviors.lock().insert(stage, behavior);
    }

    /// Returns how many times the capability behind a stage was called.
    #[must_use]
    pub fn call_count(&self, stage: StageId) -> u32 {
        self.calls.lock().get(&stage).copied().unwrap_or(0)
    }

    /// Returns the total number of collaborator calls.
    #[must_use]
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    /// Returns the serialized requests received for a stage, in call order.
    #[must_use]
    pub fn requests_for(&self, stage: StageId) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Wraps the mock as a full collaborator set.
    #[must_use]
    pub fn into_collaborators(self: Arc<Self>) -> Collaborators {
        Collaborators::from_shared(self)
    }

    async fn respond<T, R, F>(&self, stage: StageId, request: &R, output: F) -> CollaboratorResult<T>
    where
        R: Serialize + Sync,
        F: FnOnce() -> T + Send,
    {
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(stage).or_insert(0);
            *count += 1;
            *count
        };
        if let Ok(value) = serde_json::to_value(request) {
            self.requests.lock().push((stage, value));
        }

        let behavior = self
            .behaviors
            .lock()
            .get(&stage)
            .cloned()
            .unwrap_or(Behavior::Succeed);

        match behavior {
            Behavior::Succeed => Ok(output()),
            Behavior::FailTimes(n, error) if call <= n => Err(error),
            Behavior::FailTimes(..) => Ok(output()),
            Behavior::FailAlways(error) => Err(error),
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(output())
            }
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl CodeAnalyzer for MockCollaborators {
    async fn analyze(&self, request: &CodeAnalysisRequest) -> CollaboratorResult<CodeAnalysis> {
        self.respond(StageId::CodeAnalysis, request, fixtures::sample_analysis)
            .await
    }
}

#[async_trait]
impl InfraCodeGenerator for MockCollaborators {
    async fn generate(
        &self,
        request: &GenerateInfraRequest,
    ) -> CollaboratorResult<InfrastructureCode> {
        self.respond(StageId::InfrastructureGeneration, request, fixtures::sample_infrastructure)
            .await
    }
}

#[async_trait]
impl ImageBuilder for MockCollaborators {
    async fn build(&self, request: &GoldenImageRequest) -> CollaboratorResult<GoldenImageResult> {
        self.respond(StageId::GoldenImages, request, fixtures::sample_image)
            .await
    }
}

#[async_trait]
impl SopGenerator for MockCollaborators {
    async fn generate_sops(&self, request: &SopRequest) -> CollaboratorResult<SopResult> {
        self.respond(StageId::SopGeneration, request, || {
            fixtures::sample_sops(&request.operations)
        })
        .await
    }
}

#[async_trait]
impl ComplianceValidator for MockCollaborators {
    async fn validate(&self, request: &ComplianceRequest) -> CollaboratorResult<ComplianceResult> {
        self.respond(StageId::ComplianceValidation, request, fixtures::sample_compliance)
            .await
    }
}

#[async_trait]
impl CostEstimator for MockCollaborators {
    async fn estimate(&self, request: &CostRequest) -> CollaboratorResult<CostEstimate> {
        self.respond(StageId::CostEstimation, request, fixtures::sample_cost)
            .await
    }
}

#[async_trait]
impl ArtifactStore for MockCollaborators {
    async fn store(&self, drop: &ArtifactDrop) -> CollaboratorResult<DropReceipt> {
        self.respond(StageId::ArtifactStorage, drop, || {
            fixtures::sample_receipt(&drop.workflow_id)
        })
        .await
    }
}

#[async_trait]
impl Deployer for MockCollaborators {
    async fn deploy(&self, request: &DeployRequest) -> CollaboratorResult<DeploymentResult> {
        self.respond(StageId::Deployment, request, || {
            if request.dry_run {
                DeploymentResult::dry_run(&request.workflow_id)
            } else {
                fixtures::sample_deployment(&request.workflow_id)
            }
        })
        .await
    }
}
