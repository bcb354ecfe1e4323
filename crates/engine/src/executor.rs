//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Checks the workflow has exactly one input and one output node.
//! 2. Computes the execution order from the input node (cycles are rejected).
//! 3. Seeds the input node with the caller's text.
//! 4. Walks the order one node at a time, building each node's input from
//!    its upstream results and dispatching it.
//! 5. Returns the output node's result and reports every step as a
//!    [`WorkflowEvent`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use providers::Provider;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    EngineError,
    dag,
    dispatch,
    events::{EventSink, WorkflowEvent, WorkflowEventKind},
    models::{AgentWorkflow, WorkflowNode},
    state::{ExecutionState, RunHandle, RunStatus},
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on a single node's provider call, in seconds. `None`
    /// waits forever.
    pub node_timeout_secs: Option<u64>,
    /// Buffer size for an [`crate::EventBus`] built from this config.
    pub event_capacity: usize,
}

impl ExecutorConfig {
    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            node_timeout_secs: None,
            event_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider registry
// ---------------------------------------------------------------------------

/// Maps provider identifiers (`"claude"`, `"gpt"`, ...) to implementations.
pub type ProviderRegistry = HashMap<String, Arc<dyn Provider>>;

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator over explicit run handles.
///
/// Construct one executor per process and call [`WorkflowExecutor::execute`]
/// (or [`WorkflowExecutor::execute_with`] to keep a handle on the run) as many
/// times as needed, concurrently if desired.
pub struct WorkflowExecutor {
    providers: ProviderRegistry,
    events: Arc<dyn EventSink>,
    config: ExecutorConfig,
}

/// Everything one run needs, bundled so helpers stay small.
struct Run<'a> {
    workflow: &'a AgentWorkflow,
    run_id: Uuid,
    handle: &'a RunHandle,
    cancel: CancellationToken,
}

impl Run<'_> {
    fn event(&self, kind: WorkflowEventKind) -> WorkflowEvent {
        WorkflowEvent {
            workflow_id: self.workflow.id.clone(),
            run_id: self.run_id,
            kind,
        }
    }

    /// Mutate this run's state, unless the handle has since been reused.
    fn update(&self, f: impl FnOnce(&mut ExecutionState)) {
        let run_id = self.run_id;
        self.handle.update(|state| {
            if state.run_id == run_id {
                f(state);
            }
        });
    }
}

impl WorkflowExecutor {
    /// Create a new executor.
    pub fn new(
        providers: ProviderRegistry,
        events: Arc<dyn EventSink>,
        config: ExecutorConfig,
    ) -> Self {
        Self { providers, events, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run the workflow on a fresh handle and return the output node's result.
    ///
    /// # Errors
    /// See [`WorkflowExecutor::execute_with`].
    pub async fn execute(&self, workflow: &AgentWorkflow, input: &str) -> Result<String, EngineError> {
        self.execute_with(workflow, input, &RunHandle::new()).await
    }

    /// Run the workflow, recording progress on `handle`.
    ///
    /// Structural problems (missing or duplicated input/output node, cycles)
    /// are returned before any state is created or event emitted. Every other
    /// failure marks the run as errored, emits one `workflowError`, and is
    /// returned unchanged.
    #[instrument(skip(self, workflow, input, handle), fields(workflow_id = %workflow.id))]
    pub async fn execute_with(
        &self,
        workflow: &AgentWorkflow,
        input: &str,
        handle: &RunHandle,
    ) -> Result<String, EngineError> {
        // ------------------------------------------------------------------
        // Structural checks and ordering.
        // ------------------------------------------------------------------
        let (input_node, output_node) = dag::endpoints(workflow)?;
        let order = dag::execution_order(workflow, &input_node.id)?;
        debug!(order = ?order, "execution order resolved");

        // ------------------------------------------------------------------
        // Start the run.
        // ------------------------------------------------------------------
        let state = ExecutionState::start(&workflow.id);
        let run = Run {
            workflow,
            run_id: state.run_id,
            handle,
            cancel: handle.begin(state),
        };
        info!(run_id = %run.run_id, nodes = order.len(), "workflow run started");

        match self.drive(&run, &order, input_node, output_node, input).await {
            Ok(result) => {
                run.update(|state| {
                    state.status = RunStatus::Completed;
                    state.current_node_id = None;
                    state.completed_at = Some(Utc::now());
                });
                info!(run_id = %run.run_id, "workflow run completed");
                self.events
                    .emit(&run.event(WorkflowEventKind::WorkflowComplete { result: result.clone() }));
                Ok(result)
            }
            Err(err) => {
                let message = err.to_string();
                run.update(|state| {
                    state.status = RunStatus::Error;
                    state.error = Some(message.clone());
                    state.completed_at = Some(Utc::now());
                });
                error!(run_id = %run.run_id, error = %err, "workflow run failed");
                self.events
                    .emit(&run.event(WorkflowEventKind::WorkflowError { error: message }));
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        run: &Run<'_>,
        order: &[String],
        input_node: &WorkflowNode,
        output_node: &WorkflowNode,
        seed: &str,
    ) -> Result<String, EngineError> {
        let mut results: HashMap<String, String> = HashMap::new();

        // ------------------------------------------------------------------
        // Seed the input node.
        // ------------------------------------------------------------------
        results.insert(input_node.id.clone(), seed.to_owned());
        run.update(|state| {
            state.node_results.insert(input_node.id.clone(), seed.to_owned());
        });
        self.events.emit(&run.event(WorkflowEventKind::NodeComplete {
            node_id: input_node.id.clone(),
            result: seed.to_owned(),
        }));

        // ------------------------------------------------------------------
        // Execute the remaining nodes sequentially.
        // ------------------------------------------------------------------
        for node_id in order.iter().filter(|id| **id != input_node.id) {
            let Some(node) = run.workflow.node(node_id) else {
                debug!(node_id = %node_id, "skipping connection target that is not a node");
                continue;
            };

            if run.cancel.is_cancelled() {
                warn!(run_id = %run.run_id, node_id = %node_id, "run stopped before node");
                return Err(EngineError::Stopped);
            }

            run.update(|state| state.current_node_id = Some(node_id.clone()));
            self.events
                .emit(&run.event(WorkflowEventKind::NodeStart { node_id: node_id.clone() }));

            let node_input = dispatch::combined_input(run.workflow, node_id, &results);
            match self.dispatch(run, node, node_input, seed).await {
                Ok(output) => {
                    info!(node_id = %node_id, chars = output.len(), "node succeeded");
                    results.insert(node_id.clone(), output.clone());
                    run.update(|state| {
                        state.node_results.insert(node_id.clone(), output.clone());
                    });
                    self.events.emit(&run.event(WorkflowEventKind::NodeComplete {
                        node_id: node_id.clone(),
                        result: output,
                    }));
                }
                Err(err) => {
                    error!(node_id = %node_id, error = %err, "node failed");
                    self.events.emit(&run.event(WorkflowEventKind::NodeError {
                        node_id: node_id.clone(),
                        error: err.to_string(),
                    }));
                    return Err(err);
                }
            }
        }

        // An output node that was never reached resolves to the empty string.
        Ok(results.remove(&output_node.id).unwrap_or_default())
    }

    // -----------------------------------------------------------------------
    // Internal: dispatch one node under the run's cancellation token and the
    // configured timeout.
    // -----------------------------------------------------------------------

    async fn dispatch(
        &self,
        run: &Run<'_>,
        node: &WorkflowNode,
        input: String,
        seed: &str,
    ) -> Result<String, EngineError> {
        let call = dispatch::dispatch_node(node, input, seed, &self.providers);

        let bounded = async {
            match self.config.node_timeout() {
                Some(timeout) => tokio::time::timeout(timeout, call)
                    .await
                    .unwrap_or_else(|_| {
                        Err(EngineError::NodeTimeout {
                            node_id: node.id.clone(),
                            timeout,
                        })
                    }),
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = run.cancel.cancelled() => {
                warn!(node_id = %node.id, "run stopped while node was in flight");
                Err(EngineError::Stopped)
            }
            result = bounded => result,
        }
    }
}
