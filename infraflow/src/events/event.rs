//! Lifecycle event records.

use serde::Serialize;
use serde_json::Value;

/// One workflow lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowEvent {
    /// Event name, one of the constants in [`crate::events`].
    pub event_type: &'static str,
    /// Workflow the event belongs to.
    pub workflow_id: String,
    /// Stage the event belongs to, for `stage.*` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    /// Event-specific fields.
    pub data: Value,
}

impl WorkflowEvent {
    /// Creates a workflow-level event.
    #[must_use]
    pub fn workflow(event_type: &'static str, workflow_id: impl Into<String>, data: Value) -> Self {
        Self {
            event_type,
            workflow_id: workflow_id.into(),
            stage: None,
            data,
        }
    }

    /// Creates a stage-level event.
    #[must_use]
    pub fn stage(
        event_type: &'static str,
        workflow_id: impl Into<String>,
        stage: &'static str,
        data: Value,
    ) -> Self {
        Self {
            event_type,
            workflow_id: workflow_id.into(),
            stage: Some(stage),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{STAGE_GATED, WORKFLOW_STARTED};
    use serde_json::json;

    #[test]
    fn test_workflow_event_omits_stage() {
        let event = WorkflowEvent::workflow(WORKFLOW_STARTED, "wf-1", json!({"provider": "aws"}));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event_type"], "workflow.started");
        assert_eq!(value["data"]["provider"], "aws");
        assert!(value.get("stage").is_none());
    }

    #[test]
    fn test_stage_event_carries_stage() {
        let event = WorkflowEvent::stage(STAGE_GATED, "wf-1", "golden_images", Value::Null);
        assert_eq!(event.stage, Some("golden_images"));
        assert_eq!(serde_json::to_value(&event).unwrap()["stage"], "golden_images");
    }
}
