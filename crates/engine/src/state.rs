//! Per-run state and the handle that owns it.
//!
//! Every run gets its own [`ExecutionState`], held behind a [`RunHandle`]
//! the caller can keep. Two runs on the same executor never share state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Possible statuses for a run. There is no idle state: an idle handle
/// simply has no [`ExecutionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running   => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error     => write!(f, "error"),
        }
    }
}

/// Bookkeeping for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
    /// node id → resolved result.
    pub node_results: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    pub(crate) fn start(workflow_id: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id: workflow_id.to_owned(),
            status: RunStatus::Running,
            current_node_id: None,
            node_results: HashMap::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn result(&self, node_id: &str) -> Option<&str> {
        self.node_results.get(node_id).map(String::as_str)
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

#[derive(Debug, Default)]
struct RunSlot {
    state: Option<ExecutionState>,
    cancel: CancellationToken,
}

/// Caller-owned handle to a run.
///
/// Cheap to clone; all clones observe the same run. Reusing a handle for a
/// second run replaces the first run's state.
#[derive(Debug, Clone, Default)]
pub struct RunHandle {
    slot: Arc<Mutex<RunSlot>>,
}

impl RunHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current run, or `None` if no run has started.
    pub fn state(&self) -> Option<ExecutionState> {
        self.lock().state.clone()
    }

    /// Id of the current run, if any.
    pub fn run_id(&self) -> Option<Uuid> {
        self.lock().state.as_ref().map(|s| s.run_id)
    }

    /// Ask the current run to stop.
    ///
    /// Returns `false` when there is nothing to stop. The executor notices
    /// the request before the next node starts, or immediately if a provider
    /// call is in flight, and finishes the run with a `workflowError`.
    pub fn stop(&self) -> bool {
        let slot = self.lock();
        match &slot.state {
            Some(state) if state.is_running() => {
                slot.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().cancel.is_cancelled()
    }

    /// Install a fresh running state and return its cancellation token.
    pub(crate) fn begin(&self, state: ExecutionState) -> CancellationToken {
        let mut slot = self.lock();
        slot.cancel = CancellationToken::new();
        slot.state = Some(state);
        slot.cancel.clone()
    }

    /// Mutate the current state. No-op when the handle is idle.
    pub(crate) fn update(&self, f: impl FnOnce(&mut ExecutionState)) {
        if let Some(state) = self.lock().state.as_mut() {
            f(state);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunSlot> {
        // State is plain data; a poisoned lock still holds a usable value.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_handle_has_no_state_and_cannot_stop() {
        let handle = RunHandle::new();
        assert!(handle.state().is_none());
        assert!(handle.run_id().is_none());
        assert!(!handle.stop());
        assert!(!handle.is_stopped());
    }

    #[test]
    fn stop_cancels_a_running_run_only() {
        let handle = RunHandle::new();
        let token = handle.begin(ExecutionState::start("wf"));
        assert!(handle.stop());
        assert!(token.is_cancelled());

        handle.update(|s| s.status = RunStatus::Error);
        assert!(!handle.stop());
    }

    #[test]
    fn begin_replaces_previous_run_and_token() {
        let handle = RunHandle::new();
        let first = handle.begin(ExecutionState::start("wf"));
        let first_id = handle.run_id().unwrap();
        handle.stop();

        let second = handle.begin(ExecutionState::start("wf"));
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_ne!(handle.run_id().unwrap(), first_id);
    }

    #[test]
    fn clones_share_the_run() {
        let handle = RunHandle::new();
        let observer = handle.clone();
        handle.begin(ExecutionState::start("wf"));
        handle.update(|s| {
            s.node_results.insert("in".into(), "hello".into());
        });
        assert_eq!(observer.state().unwrap().result("in"), Some("hello"));
    }

    #[test]
    fn state_serializes_status_and_millis() {
        let state = ExecutionState::start("wf");
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["startedAt"], state.started_at.timestamp_millis());
        assert!(value["completedAt"].is_null());
    }
}
