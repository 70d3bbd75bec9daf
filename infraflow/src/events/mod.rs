//! Workflow lifecycle events.
//!
//! The orchestrator emits one event per lifecycle transition to the
//! configured [`EventSink`]. Every [`WorkflowEvent`] carries its workflow
//! id; stage events also carry the stage name.

mod event;
mod sink;

pub use event::WorkflowEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink};

/// A workflow run began.
pub const WORKFLOW_STARTED: &str = "workflow.started";
/// A workflow finished with status `completed`.
pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
/// A workflow finished with status `deployment_failed`.
pub const WORKFLOW_DEPLOYMENT_FAILED: &str = "workflow.deployment_failed";
/// A workflow finished with status `aborted`.
pub const WORKFLOW_ABORTED: &str = "workflow.aborted";
/// A stage started executing.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage completed.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage failed after its final attempt.
pub const STAGE_FAILED: &str = "stage.failed";
/// A stage was left out by its feature gate.
pub const STAGE_GATED: &str = "stage.gated";
