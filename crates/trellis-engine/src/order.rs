//! Execution-order derivation.
//!
//! Depth-first topological ordering with three-color marking. The traversal
//! starts from input-type nodes and nodes with no incoming edge, appends
//! each node after all of its successors (post-order), and reverses the
//! result so inputs precede their dependents. Nodes never reached by the
//! traversal are appended in declaration order before the reverse, so they
//! surface at the head of the plan.

use std::collections::{HashMap, HashSet};

use trellis_core::error::{Result, TrellisError};
use trellis_core::graph::{Edge, Node};

/// Compute the execution order for a graph.
///
/// Fails with [`TrellisError::CycleDetected`] naming the offending node;
/// the runner recovers from that locally via [`fallback_order`] and never
/// surfaces it to the caller.
pub fn execution_order(nodes: &[Node], edges: &[Edge]) -> Result<Vec<Node>> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }

    // Adjacency: node id -> successor ids. Edges from unknown sources are
    // dropped; edges to unknown targets are traversed but never yield a node.
    let mut graph: HashMap<&str, Vec<&str>> = nodes
        .iter()
        .map(|n| (n.id.as_str(), Vec::new()))
        .collect();
    for edge in edges {
        if let Some(successors) = graph.get_mut(edge.source.as_str()) {
            successors.push(edge.target.as_str());
        }
    }

    let mut start_ids: Vec<&str> = nodes
        .iter()
        .filter(|n| n.is_input() || !edges.iter().any(|e| e.target == n.id))
        .map(|n| n.id.as_str())
        .collect();
    if start_ids.is_empty() {
        start_ids.push(nodes[0].id.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_progress: HashSet<&str> = HashSet::new();
    let mut post_order: Vec<&str> = Vec::new();

    for id in start_ids {
        if !visited.contains(id) {
            visit(id, &graph, &mut visited, &mut in_progress, &mut post_order)?;
        }
    }

    // Disconnected remainder, declaration order, before the final reverse.
    for node in nodes {
        if !visited.contains(node.id.as_str()) {
            post_order.push(node.id.as_str());
        }
    }

    post_order.reverse();

    let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    Ok(post_order
        .iter()
        .filter_map(|id| by_id.get(id).map(|n| (*n).clone()))
        .collect())
}

fn visit<'a>(
    id: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    in_progress: &mut HashSet<&'a str>,
    post_order: &mut Vec<&'a str>,
) -> Result<()> {
    if in_progress.contains(id) {
        return Err(TrellisError::CycleDetected(id.to_string()));
    }
    if visited.contains(id) {
        return Ok(());
    }

    in_progress.insert(id);
    if let Some(successors) = graph.get(id) {
        for succ in successors {
            visit(succ, graph, visited, in_progress, post_order)?;
        }
    }
    in_progress.remove(id);
    visited.insert(id);
    post_order.push(id);
    Ok(())
}

/// Heuristic order used when the DFS cannot produce one: input nodes, then
/// everything else, then output nodes, declaration order within each group.
pub fn fallback_order(nodes: &[Node]) -> Vec<Node> {
    let inputs = nodes.iter().filter(|n| n.is_input()).cloned();
    let others = nodes
        .iter()
        .filter(|n| !n.is_input() && !n.is_output())
        .cloned();
    let outputs = nodes.iter().filter(|n| n.is_output()).cloned();
    inputs.chain(others).chain(outputs).collect()
}
