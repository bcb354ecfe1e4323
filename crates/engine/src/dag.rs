//! Graph analysis: reachability, execution order, and workflow validation.
//!
//! Three entry points:
//! 1. [`reachable_from`]: breadth-first discovery order from a start node.
//! 2. [`execution_order`]: topological order of the reachable subgraph,
//!    the order the executor dispatches nodes in.
//! 3. [`validate_workflow`]: whole-workflow lint for tooling.
//!
//! Ordering is deterministic: whenever several nodes are ready at once, the
//! one discovered (or declared) first goes first.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::{
    EngineError,
    models::{AgentWorkflow, NodeKind, WorkflowNode},
};

/// Node ids reachable from `start`, each exactly once, in breadth-first
/// discovery order. `start` is always first, even if it is not a node of the
/// workflow. Cycles terminate through the visited set.
pub fn reachable_from(workflow: &AgentWorkflow, start: &str) -> Vec<String> {
    let mut queue: VecDeque<&str> = VecDeque::from([start]);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut order: Vec<String> = Vec::new();

    while let Some(node_id) = queue.pop_front() {
        if !visited.insert(node_id) {
            continue;
        }
        order.push(node_id.to_owned());

        for conn in workflow.outgoing(node_id) {
            let target = conn.target_node_id.as_str();
            if !visited.contains(target) {
                queue.push_back(target);
            }
        }
    }

    order
}

/// Dispatch order for a run starting at `start`.
///
/// Reachability comes from [`reachable_from`]; the order itself is Kahn's
/// algorithm over the reachable subgraph, counting only edges whose source
/// is reachable. A node is therefore released only once every reachable
/// predecessor has been released.
///
/// # Errors
/// [`EngineError::CycleDetected`] naming the nodes that sit on a cycle.
pub fn execution_order(workflow: &AgentWorkflow, start: &str) -> Result<Vec<String>, EngineError> {
    let reachable = reachable_from(workflow, start);
    let ids: Vec<&str> = reachable.iter().map(String::as_str).collect();
    let reachable_set: HashSet<&str> = ids.iter().copied().collect();

    let edges: Vec<(&str, &str)> = workflow
        .connections
        .iter()
        .map(|c| (c.source_node_id.as_str(), c.target_node_id.as_str()))
        .filter(|(from, to)| reachable_set.contains(from) && reachable_set.contains(to))
        .collect();

    topological_sort(&ids, &edges).map_err(|node_ids| EngineError::CycleDetected { node_ids })
}

/// Locate the unique `input` and `output` nodes.
///
/// # Errors
/// - [`EngineError::MissingInputNode`] / [`EngineError::MissingOutputNode`]
///   when either is absent.
/// - [`EngineError::AmbiguousNode`] when either appears more than once.
pub fn endpoints(workflow: &AgentWorkflow) -> Result<(&WorkflowNode, &WorkflowNode), EngineError> {
    let input = single_node(workflow, NodeKind::Input)?.ok_or(EngineError::MissingInputNode)?;
    let output = single_node(workflow, NodeKind::Output)?.ok_or(EngineError::MissingOutputNode)?;
    Ok((input, output))
}

fn single_node(
    workflow: &AgentWorkflow,
    kind: NodeKind,
) -> Result<Option<&WorkflowNode>, EngineError> {
    let mut matches = workflow.nodes_of_kind(kind);
    let first = matches.next();
    let extra = matches.count();
    if extra > 0 {
        return Err(EngineError::AmbiguousNode { kind, count: extra + 1 });
    }
    Ok(first)
}

/// Validate the whole workflow and return every node in topological order.
///
/// Stricter than what a run needs: the executor tolerates dangling
/// connections and only inspects the reachable subgraph.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if a connection references a missing node.
/// - Any error from [`endpoints`].
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_workflow(workflow: &AgentWorkflow) -> Result<Vec<String>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate connection endpoints
    // -----------------------------------------------------------------------
    for conn in &workflow.connections {
        for (node_id, side) in [(&conn.source_node_id, "source"), (&conn.target_node_id, "target")] {
            if !seen_ids.contains(node_id.as_str()) {
                return Err(EngineError::UnknownNodeReference {
                    connection_id: conn.id.clone(),
                    node_id: node_id.clone(),
                    side,
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // 3. Exactly one input and one output
    // -----------------------------------------------------------------------
    endpoints(workflow)?;

    // -----------------------------------------------------------------------
    // 4. Topological sort over every node
    // -----------------------------------------------------------------------
    let ids: Vec<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
    let edges: Vec<(&str, &str)> = workflow
        .connections
        .iter()
        .map(|c| (c.source_node_id.as_str(), c.target_node_id.as_str()))
        .collect();

    topological_sort(&ids, &edges).map_err(|node_ids| EngineError::CycleDetected { node_ids })
}

/// Kahn's algorithm. `ids` fixes the tie-break rank; every edge endpoint must
/// appear in `ids`. On failure returns the ids that lie on a cycle.
fn topological_sort(ids: &[&str], edges: &[(&str, &str)]) -> Result<Vec<String>, Vec<String>> {
    let rank: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = ids.iter().map(|&id| (id, 0)).collect();

    for &(from, to) in edges {
        adjacency.entry(from).or_default().push(to);
        *in_degree.entry(to).or_insert(0) += 1;
    }

    // Ready nodes, smallest rank first.
    let mut ready: BTreeSet<usize> = ids
        .iter()
        .enumerate()
        .filter(|(_, id)| in_degree[*id] == 0)
        .map(|(i, _)| i)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(ids.len());

    while let Some(index) = ready.pop_first() {
        let node_id = ids[index];
        sorted.push(node_id.to_owned());

        for &neighbour in adjacency.get(node_id).into_iter().flatten() {
            let deg = in_degree.entry(neighbour).or_insert(0);
            *deg -= 1;
            if *deg == 0 {
                ready.insert(rank[neighbour]);
            }
        }
    }

    if sorted.len() == ids.len() {
        return Ok(sorted);
    }

    // Whatever is left either sits on a cycle or hangs off one. Peel away
    // nodes with no remaining successors until only the cycles remain.
    let mut remaining: HashSet<&str> = ids
        .iter()
        .copied()
        .filter(|id| in_degree[id] > 0)
        .collect();
    loop {
        let sinks: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|id| {
                !adjacency
                    .get(id)
                    .into_iter()
                    .flatten()
                    .any(|next| remaining.contains(next))
            })
            .collect();
        if sinks.is_empty() {
            break;
        }
        for id in sinks {
            remaining.remove(id);
        }
    }

    let mut on_cycle: Vec<&str> = remaining.into_iter().collect();
    on_cycle.sort_by_key(|id| rank[id]);
    Err(on_cycle.into_iter().map(str::to_owned).collect())
}
