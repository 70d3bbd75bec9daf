//! Workflow state: the per-run aggregator and the persistent store.

mod aggregator;
mod store;

pub use aggregator::ResultAggregator;
pub use store::{FileWorkflowStore, InMemoryWorkflowStore, WorkflowStore};
