//! Core domain model types.
//!
//! This module contains the types that flow through the engine:
//! - Stage and workflow status enums
//! - The provisioning request
//! - The workflow result

mod request;
mod status;
mod workflow;

pub use request::ProvisioningRequest;
pub use status::{StageStatus, WorkflowStatus};
pub use workflow::{WorkflowFailure, WorkflowResult};
