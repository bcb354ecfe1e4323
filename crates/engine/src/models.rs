//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. They carry no behaviour beyond small lookups; execution lives in
//! [`crate::executor`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// The closed set of node types the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Input,
    Agent,
    Output,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Agent => "agent",
            Self::Output => "output",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input"  => Ok(Self::Input),
            "agent"  => Ok(Self::Agent),
            "output" => Ok(Self::Output),
            other    => Err(format!("unknown node type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

/// Configuration of an `input` or `output` node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub label: Option<String>,
}

/// Configuration of an `agent` node.
///
/// Editor forms store every field as text, so numbers are also accepted as
/// strings and fields of the wrong shape fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Identifier of the registered provider to call (`"claude"`, `"gpt"`, ...).
    /// Empty when the payload did not name one.
    #[serde(default, deserialize_with = "lenient::string")]
    pub provider: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub system_prompt: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f32",
        skip_serializing_if = "Option::is_none"
    )]
    pub temperature: Option<f32>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_tokens: Option<u32>,
}

impl AgentConfig {
    pub fn new(provider: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            system_prompt: system_prompt.into(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Type-specific node payload. The variant *is* the node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    Input(PortConfig),
    Agent(AgentConfig),
    Output(PortConfig),
    /// A node whose type tag or payload the engine does not understand.
    /// Produced by the import adapter instead of rejecting the export; fails
    /// at dispatch time.
    Unrecognized {
        kind: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl NodeConfig {
    /// Build a config from a raw type tag and payload.
    ///
    /// The tag alone decides the variant: only unknown tags become
    /// [`NodeConfig::Unrecognized`]. A payload that is not an object yields
    /// the variant's default config.
    pub fn from_parts(kind: &str, data: serde_json::Value) -> Self {
        match kind.parse::<NodeKind>() {
            Ok(NodeKind::Input) => Self::Input(serde_json::from_value(data).unwrap_or_default()),
            Ok(NodeKind::Agent) => Self::Agent(serde_json::from_value(data).unwrap_or_default()),
            Ok(NodeKind::Output) => Self::Output(serde_json::from_value(data).unwrap_or_default()),
            Err(_) => Self::Unrecognized { kind: kind.to_owned(), data },
        }
    }

    /// The node type, or `None` for unrecognized nodes.
    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            Self::Input(_) => Some(NodeKind::Input),
            Self::Agent(_) => Some(NodeKind::Agent),
            Self::Output(_) => Some(NodeKind::Output),
            Self::Unrecognized { .. } => None,
        }
    }

    /// The raw type tag as it would appear in an export.
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Unrecognized { kind, .. } => kind,
            other => other.kind().map(|k| k.as_str()).unwrap_or_default(),
        }
    }

    /// The payload as it would appear in an export's `data` field.
    pub fn to_data(&self) -> serde_json::Value {
        let value = match self {
            Self::Input(c) | Self::Output(c) => serde_json::to_value(c),
            Self::Agent(c) => serde_json::to_value(c),
            Self::Unrecognized { data, .. } => return data.clone(),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

/// Field deserializers that never fail on a wrongly-typed value.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        })
    }

    /// Strings only; anything else is dropped.
    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn opt_f32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f32>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64().map(|v| v as f32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// WorkflowNode
// ---------------------------------------------------------------------------

/// Editor position. Presentation only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single vertex in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within this workflow (referenced by connections).
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: Position,
    pub config: NodeConfig,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: Position::default(),
            config,
        }
    }

    pub fn input(id: impl Into<String>) -> Self {
        Self::new(id, "Input", NodeConfig::Input(PortConfig::default()))
    }

    pub fn output(id: impl Into<String>) -> Self {
        Self::new(id, "Output", NodeConfig::Output(PortConfig::default()))
    }

    pub fn agent(id: impl Into<String>, config: AgentConfig) -> Self {
        Self::new(id, "Agent", NodeConfig::Agent(config))
    }

    pub fn kind(&self) -> Option<NodeKind> {
        self.config.kind()
    }
}

// ---------------------------------------------------------------------------
// NodeConnection
// ---------------------------------------------------------------------------

/// Directed edge from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConnection {
    pub id: String,
    pub source_node_id: String,
    pub source_output: String,
    pub target_node_id: String,
    pub target_input: String,
}

impl NodeConnection {
    /// Connect `output_1` of `source` to `input_1` of `target`.
    pub fn between(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{source}-{target}"),
            source_node_id: source,
            source_output: "output_1".into(),
            target_node_id: target,
            target_input: "input_1".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentWorkflow
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentWorkflow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<WorkflowNode>,
    pub connections: Vec<NodeConnection>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl AgentWorkflow {
    /// Convenience constructor; both timestamps are set to now.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        nodes: Vec<WorkflowNode>,
        connections: Vec<NodeConnection>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            nodes,
            connections,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All nodes of the given kind, in declaration order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &WorkflowNode> {
        self.nodes.iter().filter(move |n| n.kind() == Some(kind))
    }

    /// Connections whose target is `node_id`, in declaration order.
    pub fn incoming(&self, node_id: &str) -> impl Iterator<Item = &NodeConnection> + '_ {
        let node_id = node_id.to_owned();
        self.connections
            .iter()
            .filter(move |c| c.target_node_id == node_id)
    }

    /// Connections whose source is `node_id`, in declaration order.
    pub fn outgoing(&self, node_id: &str) -> impl Iterator<Item = &NodeConnection> + '_ {
        let node_id = node_id.to_owned();
        self.connections
            .iter()
            .filter(move |c| c.source_node_id == node_id)
    }
}
