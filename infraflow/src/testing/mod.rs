//! Testing utilities for provisioning workflows.
//!
//! This module provides:
//! - Scripted mock collaborators
//! - Request and output fixtures
//! - Assertions over workflow results

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_stage_absent, assert_stage_status, assert_stages, assert_workflow_status,
};
pub use fixtures::{full_request, minimal_request};
pub use mocks::{Behavior, MockCollaborators};
