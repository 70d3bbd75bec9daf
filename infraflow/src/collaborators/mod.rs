//! External collaborator capabilities.
//!
//! Each stage calls exactly one collaborator. The engine only sees these
//! traits; concrete implementations live behind them (an HTTP client with the
//! `http` feature, scripted mocks in [`crate::testing`]).

#[cfg(feature = "http")]
mod http;
mod models;

#[cfg(feature = "http")]
pub use http::HttpCollaborators;
pub use models::{
    ArtifactDrop, CodeAnalysis, CodeAnalysisRequest, ComplianceRequest, ComplianceResult,
    CostEstimate, CostRequest, DeployRequest, DeploymentResult, DropReceipt,
    GenerateInfraRequest, GoldenImageRequest, GoldenImageResult, InfrastructureCode,
    ResourceRequirement, Runbook, SopRequest, SopResult, SopStep, COMPLIANCE_THRESHOLD,
};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::errors::CollaboratorError;

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Derives infrastructure requirements from an application.
#[async_trait]
pub trait CodeAnalyzer: Send + Sync {
    /// Analyzes the workflow's application.
    async fn analyze(&self, request: &CodeAnalysisRequest) -> CollaboratorResult<CodeAnalysis>;
}

/// Generates infrastructure-as-code.
#[async_trait]
pub trait InfraCodeGenerator: Send + Sync {
    /// Generates code for the requested resources.
    async fn generate(&self, request: &GenerateInfraRequest)
        -> CollaboratorResult<InfrastructureCode>;
}

/// Builds hardened machine images.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Builds a golden image.
    async fn build(&self, request: &GoldenImageRequest) -> CollaboratorResult<GoldenImageResult>;
}

/// Generates operational runbooks.
#[async_trait]
pub trait SopGenerator: Send + Sync {
    /// Generates SOPs for the requested operations.
    async fn generate_sops(&self, request: &SopRequest) -> CollaboratorResult<SopResult>;
}

/// Validates generated code against compliance frameworks.
#[async_trait]
pub trait ComplianceValidator: Send + Sync {
    /// Validates the code.
    async fn validate(&self, request: &ComplianceRequest) -> CollaboratorResult<ComplianceResult>;
}

/// Prices a set of resources.
#[async_trait]
pub trait CostEstimator: Send + Sync {
    /// Estimates running cost.
    async fn estimate(&self, request: &CostRequest) -> CollaboratorResult<CostEstimate>;
}

/// Persists stage artifacts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores a drop.
    async fn store(&self, drop: &ArtifactDrop) -> CollaboratorResult<DropReceipt>;
}

/// Applies generated infrastructure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Deploys the code. A dry-run request must not mutate anything.
    async fn deploy(&self, request: &DeployRequest) -> CollaboratorResult<DeploymentResult>;
}

/// The full set of collaborators a workflow needs.
#[derive(Clone)]
pub struct Collaborators {
    /// Code analyzer.
    pub analyzer: Arc<dyn CodeAnalyzer>,
    /// Infrastructure code generator.
    pub generator: Arc<dyn InfraCodeGenerator>,
    /// Golden image builder.
    pub image_builder: Arc<dyn ImageBuilder>,
    /// SOP generator.
    pub sop_generator: Arc<dyn SopGenerator>,
    /// Compliance validator.
    pub compliance: Arc<dyn ComplianceValidator>,
    /// Cost estimator.
    pub cost_estimator: Arc<dyn CostEstimator>,
    /// Artifact store.
    pub artifact_store: Arc<dyn ArtifactStore>,
    /// Deployer.
    pub deployer: Arc<dyn Deployer>,
}

impl Collaborators {
    /// Uses a single value that implements every capability.
    pub fn from_shared<T>(shared: Arc<T>) -> Self
    where
        T: CodeAnalyzer
            + InfraCodeGenerator
            + ImageBuilder
            + SopGenerator
            + ComplianceValidator
            + CostEstimator
            + ArtifactStore
            + Deployer
            + 'static,
    {
        Self {
            analyzer: shared.clone(),
            generator: shared.clone(),
            image_builder: shared.clone(),
            sop_generator: shared.clone(),
            compliance: shared.clone(),
            cost_estimator: shared.clone(),
            artifact_store: shared.clone(),
            deployer: shared,
        }
    }

    /// Replaces the artifact store.
    #[must_use]
    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifact_store = store;
        self
    }

    /// Replaces the deployer.
    #[must_use]
    pub fn with_deployer(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.deployer = deployer;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
