//! Engine-level error types.

use std::time::Duration;

use thiserror::Error;

use providers::ProviderError;

use crate::models::NodeKind;

/// Message recorded on a run that was cancelled through its handle.
pub const STOPPED_BY_USER: &str = "Workflow execution stopped by user";

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Structural errors ------

    /// The workflow has no `input` node.
    #[error("Workflow must have an Input node")]
    MissingInputNode,

    /// The workflow has no `output` node.
    #[error("Workflow must have an Output node")]
    MissingOutputNode,

    /// More than one node of a kind that must be unique.
    #[error("Workflow must have exactly one {kind} node, found {count}")]
    AmbiguousNode { kind: NodeKind, count: usize },

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection references a node ID that doesn't exist in the workflow.
    #[error("connection '{connection_id}' references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        connection_id: String,
        node_id: String,
        side: &'static str,
    },

    /// Topological sort left these nodes with unresolved predecessors.
    #[error("workflow graph contains a cycle through {}", .node_ids.join(", "))]
    CycleDetected { node_ids: Vec<String> },

    // ------ Configuration errors ------

    /// An agent node's payload did not name a provider.
    #[error("node '{node_id}': agent node has no 'provider' configured")]
    MissingProvider { node_id: String },

    /// An agent node names a provider that was never registered.
    #[error("node '{node_id}': no provider registered for '{provider}'")]
    ProviderNotRegistered { node_id: String, provider: String },

    /// The registered provider reports itself unconfigured.
    #[error("node '{node_id}': provider '{provider}' is not configured")]
    ProviderNotConfigured { node_id: String, provider: String },

    /// The node's type tag or payload is not one the engine can run.
    #[error("node '{node_id}': unsupported node type '{kind}'")]
    UnsupportedNode { node_id: String, kind: String },

    // ------ Execution errors ------

    /// The provider call failed.
    #[error("node '{node_id}' failed: {source}")]
    Provider {
        node_id: String,
        #[source]
        source: ProviderError,
    },

    /// The provider call exceeded `ExecutorConfig::node_timeout`.
    #[error("node '{node_id}' timed out after {timeout:?}")]
    NodeTimeout { node_id: String, timeout: Duration },

    /// The run was cancelled through its `RunHandle`.
    #[error("{}", STOPPED_BY_USER)]
    Stopped,

    // ------ Import errors ------

    /// The flow export could not be parsed.
    #[error("invalid flow export: {0}")]
    InvalidExport(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the error was raised by the up-front structural checks, before
    /// any run state exists.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MissingInputNode
                | Self::MissingOutputNode
                | Self::AmbiguousNode { .. }
                | Self::DuplicateNodeId(_)
                | Self::UnknownNodeReference { .. }
                | Self::CycleDetected { .. }
        )
    }
}
