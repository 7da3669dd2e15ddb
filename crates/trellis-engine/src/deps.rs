//! Abort-decision support: does any node still pending in the plan depend
//! on a failed node?

use trellis_core::graph::{Edge, Node};

/// True when a direct successor of `failed_id` is still in `remaining`
/// (the suffix of the plan not yet run). Only direct edges are inspected.
pub fn has_pending_dependents(failed_id: &str, edges: &[Edge], remaining: &[Node]) -> bool {
    edges
        .iter()
        .filter(|e| e.source == failed_id)
        .any(|e| remaining.iter().any(|n| n.id == e.target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::graph::kind;

    #[test]
    fn test_pending_direct_dependent_detected() {
        let edges = vec![Edge::new("a", "b")];
        let remaining = vec![Node::new("b", kind::TEXT)];
        assert!(has_pending_dependents("a", &edges, &remaining));
    }

    #[test]
    fn test_already_executed_dependent_is_ignored() {
        let edges = vec![Edge::new("a", "b")];
        let remaining = vec![Node::new("c", kind::TEXT)];
        assert!(!has_pending_dependents("a", &edges, &remaining));
    }

    #[test]
    fn test_no_outgoing_edges() {
        let remaining = vec![Node::new("b", kind::TEXT)];
        assert!(!has_pending_dependents("a", &[], &remaining));
    }

    #[test]
    fn test_transitive_dependents_are_not_considered() {
        // a -> b -> c with only c remaining: the check is direct-only.
        let edges = vec![Edge::new("a", "b"), Edge::new("b", "c")];
        let remaining = vec![Node::new("c", kind::TEXT)];
        assert!(!has_pending_dependents("a", &edges, &remaining));
    }
}
