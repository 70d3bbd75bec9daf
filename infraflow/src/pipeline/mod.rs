//! Stage execution and workflow orchestration.
//!
//! - `retry`: per-stage timeout and backoff policy
//! - [`executor`]: runs one collaborator call under a policy
//! - [`policy`]: decides what a stage outcome means for the workflow
//! - `orchestrator`: drives the stage table for one request

pub mod executor;
mod orchestrator;
pub mod policy;
mod retry;


pub use executor::StageExecution;
pub use orchestrator::{WorkflowOrchestrator, INFRASTRUCTURE_DROP_STAGE, INFRASTRUCTURE_DROP_TYPE};
pub use policy::{decide, Decision};
pub use retry::{
    should_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState,
    StagePolicy,
};
