//! Event sinks.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::WorkflowEvent;

/// Receives workflow lifecycle events.
///
/// Sinks must not fail the workflow: implementations log and swallow their
/// own errors.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Receives one event.
    async fn emit(&self, event: WorkflowEvent);
}

/// Writes events to `tracing` at debug level. The orchestrator's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: WorkflowEvent) {
        debug!(
            event_type = event.event_type,
            workflow_id = %event.workflow_id,
            stage = ?event.stage,
            data = %event.data,
            "Workflow event"
        );
    }
}

/// Records events in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event received so far.
    #[must_use]
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Returns the event names in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.event_type).collect()
    }

    /// Returns the events with the given name.
    #[must_use]
    pub fn of_type(&self, event_type: &str) -> Vec<WorkflowEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: WorkflowEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{STAGE_COMPLETED, STAGE_STARTED, WORKFLOW_COMPLETED};
    use serde_json::{json, Value};

    #[test]
    fn test_logging_sink_accepts_events() {
        tokio_test::block_on(LoggingEventSink.emit(WorkflowEvent::stage(
            STAGE_STARTED,
            "wf-log",
            "golden_images",
            Value::Null,
        )));
    }

    #[tokio::test]
    async fn test_collecting_sink_keeps_order() {
        let sink = CollectingEventSink::new();
        sink.emit(WorkflowEvent::stage(STAGE_STARTED, "wf-c", "code_analysis", Value::Null))
            .await;
        sink.emit(WorkflowEvent::stage(
            STAGE_COMPLETED,
            "wf-c",
            "code_analysis",
            json!({"attempts": 1}),
        ))
        .await;
        sink.emit(WorkflowEvent::workflow(WORKFLOW_COMPLETED, "wf-c", Value::Null))
            .await;

        assert_eq!(
            sink.event_types(),
            vec![STAGE_STARTED, STAGE_COMPLETED, WORKFLOW_COMPLETED]
        );
        let completed = sink.of_type(STAGE_COMPLETED);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].data["attempts"], 1);
        assert!(sink.events().iter().all(|e| e.workflow_id == "wf-c"));
    }
}
