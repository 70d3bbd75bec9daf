//! # Infraflow
//!
//! A multi-stage infrastructure provisioning workflow engine.
//!
//! Infraflow drives a fixed pipeline of dependent, independently-failable
//! stages to turn a provisioning request into generated (and optionally
//! deployed) infrastructure:
//!
//! - **Fixed stage table**: analysis, generation, image build, SOPs,
//!   compliance, cost, artifact storage and deployment, in dependency order
//! - **Feature gates**: optional stages are included only when requested
//! - **Per-stage policy**: timeouts and bounded retries with backoff
//! - **Two-tier failures**: required stages abort, optional stages warn
//! - **Partial results**: every executed stage is recorded and persisted
//! - **Cancellation and deadlines**: interrupt the in-flight call
//!
//! The engine never analyzes, generates or deploys anything itself; each
//! stage calls an external collaborator.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use infraflow::prelude::*;
//!
//! let config = EngineConfig::load(Path::new("infraflow.toml"))?;
//! let collaborators = Collaborators::from_shared(Arc::new(
//!     HttpCollaborators::new(config.endpoints.clone())?,
//! ));
//! let service = ProvisioningService::from_config(collaborators, config);
//!
//! let request = ProvisioningRequest::new("wf-42", "aws")
//!     .with_compliance("SOC2")
//!     .with_auto_deploy(true)
//!     .with_dry_run(true);
//!
//! let result = service.start_provisioning(request).await?;
//! println!("{}: {:?}", result.status, result.message);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod service;
pub mod stages;
pub mod state;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    #[cfg(feature = "http")]
    pub use crate::collaborators::HttpCollaborators;
    pub use crate::collaborators::{
        ArtifactStore, CodeAnalyzer, Collaborators, ComplianceValidator, CostEstimator, Deployer,
        ImageBuilder, InfraCodeGenerator, SopGenerator,
    };
    pub use crate::config::{EngineConfig, HttpEndpoints};
    pub use crate::core::{
        ProvisioningRequest, StageStatus, WorkflowFailure, WorkflowResult, WorkflowStatus,
    };
    pub use crate::errors::{CollaboratorError, ConfigError, ProvisionError, ProvisionResult};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, WorkflowEvent};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{RetryConfig, StagePolicy, WorkflowOrchestrator};
    pub use crate::service::ProvisioningService;
    pub use crate::stages::{StageErrorKind, StageId, StageResult};
    pub use crate::state::{FileWorkflowStore, InMemoryWorkflowStore, WorkflowStore};
}
