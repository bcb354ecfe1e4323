//! Lifecycle events and the channel they are published on.
//!
//! The executor is handed an [`EventSink`] at construction time and never
//! reaches for a global broadcaster. [`EventBus`] fans events out to any
//! number of subscribers; [`TracingSink`] mirrors them into the log.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEventKind {
    #[serde(rename_all = "camelCase")]
    NodeStart { node_id: String },
    #[serde(rename_all = "camelCase")]
    NodeComplete { node_id: String, result: String },
    #[serde(rename_all = "camelCase")]
    NodeError { node_id: String, error: String },
    WorkflowComplete { result: String },
    WorkflowError { error: String },
}

/// An immutable notification about one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    pub workflow_id: String,
    /// Identifies the run, so observers of several concurrent runs can tell
    /// their events apart.
    pub run_id: Uuid,
    #[serde(flatten)]
    pub kind: WorkflowEventKind,
}

impl WorkflowEvent {
    pub fn node_id(&self) -> Option<&str> {
        match &self.kind {
            WorkflowEventKind::NodeStart { node_id }
            | WorkflowEventKind::NodeComplete { node_id, .. }
            | WorkflowEventKind::NodeError { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&str> {
        match &self.kind {
            WorkflowEventKind::NodeComplete { result, .. }
            | WorkflowEventKind::WorkflowComplete { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.kind {
            WorkflowEventKind::NodeError { error, .. }
            | WorkflowEventKind::WorkflowError { error } => Some(error),
            _ => None,
        }
    }

    /// Whether this is the last event of its run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            WorkflowEventKind::WorkflowComplete { .. } | WorkflowEventKind::WorkflowError { .. }
        )
    }

    /// Short tag, e.g. `"nodeStart"`.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            WorkflowEventKind::NodeStart { .. } => "nodeStart",
            WorkflowEventKind::NodeComplete { .. } => "nodeComplete",
            WorkflowEventKind::NodeError { .. } => "nodeError",
            WorkflowEventKind::WorkflowComplete { .. } => "workflowComplete",
            WorkflowEventKind::WorkflowError { .. } => "workflowError",
        }
    }
}

/// Receives lifecycle events from the executor.
///
/// `emit` is called inline on the run's task and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &WorkflowEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &WorkflowEvent) {
        match event.error() {
            Some(error) => warn!(
                workflow_id = %event.workflow_id,
                run_id = %event.run_id,
                node_id = event.node_id(),
                event = event.type_name(),
                error,
                "workflow event"
            ),
            None => info!(
                workflow_id = %event.workflow_id,
                run_id = %event.run_id,
                node_id = event.node_id(),
                event = event.type_name(),
                "workflow event"
            ),
        }
    }
}

/// Event bus using a tokio broadcast channel.
/// All subscribers receive all events; drop the receiver to unsubscribe.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: &WorkflowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event.clone());
    }
}

/// Forwards every event to each inner sink in turn.
pub struct FanoutSink(pub Vec<std::sync::Arc<dyn EventSink>>);

impl EventSink for FanoutSink {
    fn emit(&self, event: &WorkflowEvent) {
        for sink in &self.0 {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: WorkflowEventKind) -> WorkflowEvent {
        WorkflowEvent {
            workflow_id: "wf".into(),
            run_id: Uuid::nil(),
            kind,
        }
    }

    #[test]
    fn serializes_with_flat_type_tag() {
        let value = serde_json::to_value(event(WorkflowEventKind::NodeComplete {
            node_id: "a".into(),
            result: "done".into(),
        }))
        .unwrap();

        assert_eq!(
            value,
            json!({
                "workflowId": "wf",
                "runId": "00000000-0000-0000-0000-000000000000",
                "type": "nodeComplete",
                "nodeId": "a",
                "result": "done",
            })
        );
    }

    #[test]
    fn accessors_expose_optional_fields() {
        let start = event(WorkflowEventKind::NodeStart { node_id: "a".into() });
        assert_eq!(start.node_id(), Some("a"));
        assert_eq!(start.result(), None);
        assert!(!start.is_terminal());

        let failed = event(WorkflowEventKind::WorkflowError { error: "boom".into() });
        assert_eq!(failed.node_id(), None);
        assert_eq!(failed.error(), Some("boom"));
        assert!(failed.is_terminal());
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let sent = event(WorkflowEventKind::WorkflowComplete { result: "ok".into() });
        bus.emit(&sent);

        assert_eq!(first.recv().await.unwrap(), sent);
        assert_eq!(second.recv().await.unwrap(), sent);
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.emit(&event(WorkflowEventKind::NodeStart { node_id: "a".into() }));

        let rx = bus.subscribe();
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
