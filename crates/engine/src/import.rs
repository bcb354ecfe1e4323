//! Graph import adapter: converts a visual-editor flow export into an
//! [`AgentWorkflow`] and back.
//!
//! The export is the editor's native JSON:
//!
//! ```json
//! { "drawflow": { "Home": { "data": {
//!     "1": { "name": "input", "class": "Input", "data": {}, "pos_x": 10, "pos_y": 20,
//!            "outputs": { "output_1": { "connections": [ { "node": "2", "output": "input_1" } ] } } }
//! } } } }
//! ```
//!
//! Import performs no validation: a broken export yields a workflow that
//! fails later, when it is executed.
//!
//! Records are visited the way the editor enumerates them: integer ids in
//! numeric order first, then any other ids in document order.

use std::collections::HashSet;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    EngineError,
    models::{AgentWorkflow, NodeConfig, NodeConnection, Position, WorkflowNode},
};

/// Module name the editor uses for its default canvas.
pub const DEFAULT_MODULE: &str = "Home";

// ---------------------------------------------------------------------------
// Export format
// ---------------------------------------------------------------------------

/// Top level of a flow export: canvas modules by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowExport {
    pub drawflow: IndexMap<String, FlowModule>,
}

/// One canvas: node records keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowModule {
    #[serde(default)]
    pub data: IndexMap<String, FlowNode>,
}

/// A single node record as the editor writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    /// The editor's own id; the map key is authoritative.
    #[serde(default)]
    pub id: Value,
    /// Node type tag (`input`, `agent`, `output`).
    #[serde(default)]
    pub name: String,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub html: String,
    /// `false` for plain HTML nodes, or the name of a component framework.
    #[serde(default)]
    pub typenode: Value,
    #[serde(default)]
    pub inputs: IndexMap<String, FlowInputPort>,
    #[serde(default)]
    pub outputs: IndexMap<String, FlowOutputPort>,
    #[serde(default)]
    pub pos_x: f64,
    #[serde(default)]
    pub pos_y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowOutputPort {
    #[serde(default)]
    pub connections: Vec<FlowOutputConnection>,
}

/// Link from an output port to `node`'s input port `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowOutputConnection {
    #[serde(alias = "targetNodeId")]
    pub node: String,
    #[serde(alias = "targetInputPort")]
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowInputPort {
    #[serde(default)]
    pub connections: Vec<FlowInputConnection>,
}

/// Link into an input port from `node`'s output port `input`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowInputConnection {
    pub node: String,
    pub input: String,
}

impl FlowExport {
    /// Parse an export from its JSON text.
    ///
    /// # Errors
    /// [`EngineError::InvalidExport`] if the text is not a flow export.
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every node record across all modules, modules in document order and
    /// records in [`FlowModule::ordered`] order.
    pub fn nodes(&self) -> impl Iterator<Item = (&String, &FlowNode)> {
        self.drawflow.values().flat_map(FlowModule::ordered)
    }
}

impl FlowModule {
    /// Records with integer ids first, ascending, then the rest in document
    /// order.
    pub fn ordered(&self) -> Vec<(&String, &FlowNode)> {
        let mut records: Vec<_> = self.data.iter().collect();
        records.sort_by_key(|(id, _)| match integer_id(id) {
            Some(n) => (0, n),
            None => (1, 0),
        });
        records
    }
}

/// `id` as a canonical non-negative integer (`"7"`, not `"07"` or `"+7"`).
fn integer_id(id: &str) -> Option<u64> {
    let n: u64 = id.parse().ok()?;
    (n.to_string() == id).then_some(n)
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Convert a flow export into a workflow stamped with the current time.
///
/// Node type comes from `name`, display name prefers a non-empty `class`, and
/// `data` becomes the node config (an empty object when absent). Every listed
/// output connection becomes one [`NodeConnection`] with id
/// `{sourceId}-{targetId}`; when two edges join the same pair the later ones
/// are suffixed with their output port.
pub fn import_flow(export: &FlowExport, id: impl Into<String>, name: impl Into<String>) -> AgentWorkflow {
    let mut nodes = Vec::new();
    let mut connections = Vec::new();
    let mut used_ids: HashSet<String> = HashSet::new();

    for (node_id, record) in export.nodes() {
        let data = record
            .data
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let display_name = record
            .class
            .as_deref()
            .filter(|class| !class.is_empty())
            .unwrap_or(&record.name);

        nodes.push(WorkflowNode {
            id: node_id.clone(),
            name: display_name.to_owned(),
            position: Position { x: record.pos_x, y: record.pos_y },
            config: NodeConfig::from_parts(&record.name, data),
        });

        for (port, output) in &record.outputs {
            for target in &output.connections {
                let conn_id = connection_id(&mut used_ids, node_id, &target.node, port);
                connections.push(NodeConnection {
                    id: conn_id,
                    source_node_id: node_id.clone(),
                    source_output: port.clone(),
                    target_node_id: target.node.clone(),
                    target_input: target.output.clone(),
                });
            }
        }
    }

    let now = Utc::now();
    AgentWorkflow {
        id: id.into(),
        name: name.into(),
        description: None,
        nodes,
        connections,
        created_at: now,
        updated_at: now,
    }
}

/// Parse and import in one step.
///
/// # Errors
/// [`EngineError::InvalidExport`] if `raw` is not a flow export.
pub fn import_flow_json(
    raw: &str,
    id: impl Into<String>,
    name: impl Into<String>,
) -> Result<AgentWorkflow, EngineError> {
    Ok(import_flow(&FlowExport::from_json(raw)?, id, name))
}

fn connection_id(used: &mut HashSet<String>, source: &str, target: &str, port: &str) -> String {
    let base = format!("{source}-{target}");
    if used.insert(base.clone()) {
        return base;
    }
    let with_port = format!("{base}-{port}");
    if used.insert(with_port.clone()) {
        return with_port;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{with_port}-{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Convert a workflow back into a flow export on the default module.
///
/// Both port directions are written so the editor can redraw the links.
pub fn to_flow_export(workflow: &AgentWorkflow) -> FlowExport {
    let mut data: IndexMap<String, FlowNode> = workflow
        .nodes
        .iter()
        .map(|node| {
            let record = FlowNode {
                id: Value::String(node.id.clone()),
                name: node.config.type_tag().to_owned(),
                class: Some(node.name.clone()),
                data: Some(node.config.to_data()),
                html: String::new(),
                typenode: Value::Bool(false),
                inputs: IndexMap::new(),
                outputs: IndexMap::new(),
                pos_x: node.position.x,
                pos_y: node.position.y,
            };
            (node.id.clone(), record)
        })
        .collect();

    for conn in &workflow.connections {
        if let Some(source) = data.get_mut(&conn.source_node_id) {
            source
                .outputs
                .entry(conn.source_output.clone())
                .or_default()
                .connections
                .push(FlowOutputConnection {
                    node: conn.target_node_id.clone(),
                    output: conn.target_input.clone(),
                });
        }
        if let Some(target) = data.get_mut(&conn.target_node_id) {
            target
                .inputs
                .entry(conn.target_input.clone())
                .or_default()
                .connections
                .push(FlowInputConnection {
                    node: conn.source_node_id.clone(),
                    input: conn.source_output.clone(),
                });
        }
    }

    FlowExport {
        drawflow: IndexMap::from([(DEFAULT_MODULE.to_owned(), FlowModule { data })]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentConfig, NodeKind};
    use serde_json::json;

    fn sample_export() -> FlowExport {
        serde_json::from_value(json!({
            "drawflow": { "Home": { "data": {
                "1": {
                    "id": 1, "name": "input", "class": "Question", "data": { "label": "Ask" },
                    "pos_x": 10.0, "pos_y": 20.0,
                    "outputs": { "output_1": { "connections": [ { "node": "2", "output": "input_1" } ] } }
                },
                "2": {
                    "id": 2, "name": "agent", "class": "",
                    "data": { "provider": "claude", "systemPrompt": "Answer briefly." },
                    "outputs": { "output_1": { "connections": [ { "node": "3", "output": "input_1" } ] } }
                },
                "3": { "id": 3, "name": "output" }
            } } }
        }))
        .unwrap()
    }

    #[test]
    fn converts_nodes_and_connections() {
        let wf = import_flow(&sample_export(), "wf-1", "Imported");

        assert_eq!(wf.id, "wf-1");
        assert_eq!(wf.name, "Imported");
        assert_eq!(wf.nodes.len(), 3);

        let input = wf.node("1").unwrap();
        assert_eq!(input.name, "Question");
        assert_eq!(input.kind(), Some(NodeKind::Input));
        assert_eq!(input.position, Position { x: 10.0, y: 20.0 });

        // Empty class falls back to the type tag.
        let agent = wf.node("2").unwrap();
        assert_eq!(agent.name, "agent");
        assert_eq!(agent.config, NodeConfig::Agent(AgentConfig::new("claude", "Answer briefly.")));

        // Missing data defaults to an empty object.
        assert_eq!(wf.node("3").unwrap().kind(), Some(NodeKind::Output));

        let ids: Vec<_> = wf.connections.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1-2", "2-3"]);
        assert_eq!(wf.connections[0].source_output, "output_1");
        assert_eq!(wf.connections[0].target_input, "input_1");
    }

    #[test]
    fn importing_twice_differs_only_in_timestamps() {
        let export = sample_export();
        let first = import_flow(&export, "wf", "same");
        let mut second = import_flow(&export, "wf", "same");

        second.created_at = first.created_at;
        second.updated_at = first.updated_at;
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_type_is_kept_not_rejected() {
        let export: FlowExport = serde_json::from_value(json!({
            "drawflow": { "Home": { "data": {
                "7": { "name": "webhook", "data": { "url": "https://example.com" } }
            } } }
        }))
        .unwrap();

        let wf = import_flow(&export, "wf", "odd");
        assert_eq!(
            wf.nodes[0].config,
            NodeConfig::Unrecognized {
                kind: "webhook".into(),
                data: json!({ "url": "https://example.com" }),
            }
        );
    }

    #[test]
    fn known_tags_survive_form_style_payloads() {
        let export: FlowExport = serde_json::from_value(json!({
            "drawflow": { "Home": { "data": {
                "1": { "name": "input", "data": { "label": 7 } },
                "2": { "name": "agent", "data": { "provider": "claude", "temperature": "0.7", "maxTokens": "300" } },
                "3": { "name": "output", "data": [] }
            } } }
        }))
        .unwrap();

        let wf = import_flow(&export, "wf", "forms");
        let kinds: Vec<_> = wf.nodes.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec![Some(NodeKind::Input), Some(NodeKind::Agent), Some(NodeKind::Output)]);

        let NodeConfig::Agent(agent) = &wf.node("2").unwrap().config else {
            panic!("node 2 should stay an agent");
        };
        assert_eq!(agent.temperature, Some(0.7));
        assert_eq!(agent.max_tokens, Some(300));
    }

    #[test]
    fn integer_ids_are_visited_numerically() {
        // 1 feeds 2..=10, which all feed 11.
        let mut records = serde_json::Map::new();
        let fan_out: Vec<_> = (2..=10)
            .map(|n| json!({ "node": n.to_string(), "output": "input_1" }))
            .collect();
        records.insert(
            "1".into(),
            json!({ "name": "input", "outputs": { "output_1": { "connections": fan_out } } }),
        );
        for n in 2..=10 {
            records.insert(
                n.to_string(),
                json!({
                    "name": "agent",
                    "data": { "provider": format!("p{n}") },
                    "outputs": { "output_1": { "connections": [ { "node": "11", "output": "input_1" } ] } }
                }),
            );
        }
        records.insert("11".into(), json!({ "name": "output" }));
        let export: FlowExport =
            serde_json::from_value(json!({ "drawflow": { "Home": { "data": records } } })).unwrap();

        let wf = import_flow(&export, "wf", "wide");

        let node_ids: Vec<String> = wf.nodes.iter().map(|n| n.id.clone()).collect();
        let expected: Vec<String> = (1..=11).map(|n| n.to_string()).collect();
        assert_eq!(node_ids, expected);

        let joined: Vec<String> = wf.incoming("11").map(|c| c.source_node_id.clone()).collect();
        let expected: Vec<String> = (2..=10).map(|n| n.to_string()).collect();
        assert_eq!(joined, expected);
    }

    #[test]
    fn named_ids_follow_document_order_after_integer_ids() {
        let raw = r#"{ "drawflow": { "Home": { "data": {
            "zeta": { "name": "agent", "data": { "provider": "gpt" } },
            "alpha": { "name": "agent", "data": { "provider": "gpt" } },
            "12": { "name": "output" },
            "03": { "name": "agent", "data": { "provider": "gpt" } },
            "4": { "name": "input" }
        } } } }"#;

        let wf = import_flow_json(raw, "wf", "mixed").unwrap();
        let node_ids: Vec<_> = wf.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(node_ids, vec!["4", "12", "zeta", "alpha", "03"]);
    }

    #[test]
    fn loose_records_do_not_fail_the_import() {
        let raw = r#"{ "drawflow": { "Home": { "data": {
            "1": { "name": "input", "typenode": "vue", "outputs": { "output_1": { "connections": [
                { "node": "2", "output": "input_1" } ] } } },
            "2": { "class": "Nameless" }
        } } } }"#;

        let wf = import_flow_json(raw, "wf", "loose").unwrap();
        assert_eq!(wf.node("1").unwrap().kind(), Some(NodeKind::Input));
        let nameless = wf.node("2").unwrap();
        assert_eq!(nameless.name, "Nameless");
        assert!(matches!(nameless.config, NodeConfig::Unrecognized { ref kind, .. } if kind.is_empty()));
        assert_eq!(wf.connections.len(), 1);
    }

    #[test]
    fn parallel_edges_get_distinct_ids() {
        let export: FlowExport = serde_json::from_value(json!({
            "drawflow": { "Home": { "data": {
                "a": { "name": "agent", "data": { "provider": "gpt" }, "outputs": {
                    "output_1": { "connections": [ { "node": "b", "output": "input_1" } ] },
                    "output_2": { "connections": [ { "node": "b", "output": "input_2" } ] }
                } },
                "b": { "name": "output" }
            } } }
        }))
        .unwrap();

        let wf = import_flow(&export, "wf", "multi");
        let ids: Vec<_> = wf.connections.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a-b", "a-b-output_2"]);
    }

    #[test]
    fn accepts_camel_case_connection_fields() {
        let raw = r#"{ "drawflow": { "Home": { "data": {
            "1": { "name": "input", "outputs": { "output_1": { "connections": [
                { "targetNodeId": "2", "targetInputPort": "input_1" } ] } } },
            "2": { "name": "output" }
        } } } }"#;

        let wf = import_flow_json(raw, "wf", "camel").unwrap();
        assert_eq!(wf.connections[0].target_node_id, "2");
        assert_eq!(wf.connections[0].target_input, "input_1");
    }

    #[test]
    fn malformed_json_is_an_import_error() {
        let err = import_flow_json("{ not json", "wf", "bad").unwrap_err();
        assert!(matches!(err, EngineError::InvalidExport(_)));
    }

    #[test]
    fn export_then_import_restores_graph() {
        let original = import_flow(&sample_export(), "wf", "round");
        let export = to_flow_export(&original);

        let agent = &export.drawflow[DEFAULT_MODULE].data["2"];
        assert_eq!(agent.inputs["input_1"].connections[0].node, "1");
        assert_eq!(agent.outputs["output_1"].connections[0].node, "3");

        let restored = import_flow(&export, "wf", "round");
        assert_eq!(restored.connections, original.connections);
        for (a, b) in restored.nodes.iter().zip(&original.nodes) {
            assert_eq!(a.config, b.config);
            assert_eq!(a.position, b.position);
        }
    }
}
