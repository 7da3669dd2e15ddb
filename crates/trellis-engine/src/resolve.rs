//! Runtime input resolution.
//!
//! For each node the resolver assembles an input map from upstream outputs
//! routed along incoming edges, or — for input-type nodes with no wired
//! inputs — from the caller-supplied initial values. This is a total
//! function: a node with nothing resolvable receives an empty map, and
//! node behaviors treat missing keys with explicit defaults.

use std::collections::HashMap;

use serde_json::Value;

use trellis_core::graph::{id_suffix, Edge, Node};
use trellis_core::run::{InputValue, NodeOutput};

/// Assemble the input map for `node_id`.
pub fn resolve_inputs(
    node_id: &str,
    edges: &[Edge],
    collected: &HashMap<String, NodeOutput>,
    initial: &HashMap<String, InputValue>,
    nodes: &[Node],
) -> HashMap<String, Value> {
    let mut inputs = HashMap::new();

    for edge in edges.iter().filter(|e| e.target == node_id) {
        let Some(output) = collected.get(&edge.source) else {
            continue;
        };

        // Legacy graphs name the handle `text`; outputs are stored under
        // `output`.
        let mut field = edge.source_field();
        if field == "text" && output.get("output").is_some() {
            field = "output";
        }

        if let Some(value) = output.get(field) {
            inputs.insert(edge.target_field().to_string(), value.clone());
        }
    }

    if inputs.is_empty() && node_id.starts_with("input") {
        let key = format!("input_{}", id_suffix(node_id));
        if let Some(initial_value) = initial.get(&key) {
            inputs.insert("input".to_string(), initial_value.value().clone());

            let input_type = nodes
                .iter()
                .find(|n| n.id == node_id)
                .and_then(|n| n.param_str("type"))
                .unwrap_or("Text");
            inputs.insert("type".to_string(), Value::String(input_type.to_string()));
        }
    }

    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::graph::kind;

    #[test]
    fn test_two_incoming_edges_resolve_both_handles() {
        let edges = vec![
            Edge::new("a", "merge").with_handles("output", "left"),
            Edge::new("b", "merge").with_handles("output", "right"),
        ];
        let mut collected = HashMap::new();
        collected.insert("a".to_string(), NodeOutput::from_output("from a"));
        collected.insert("b".to_string(), NodeOutput::from_output("from b"));

        let inputs = resolve_inputs("merge", &edges, &collected, &HashMap::new(), &[]);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs["left"], serde_json::json!("from a"));
        assert_eq!(inputs["right"], serde_json::json!("from b"));
    }

    #[test]
    fn test_text_handle_aliases_output() {
        let edges = vec![Edge::new("a", "b").with_handles("text", "input")];
        let mut collected = HashMap::new();
        collected.insert("a".to_string(), NodeOutput::from_output("payload"));

        let inputs = resolve_inputs("b", &edges, &collected, &HashMap::new(), &[]);
        assert_eq!(inputs["input"], serde_json::json!("payload"));
    }

    #[test]
    fn test_source_not_yet_executed_is_skipped() {
        let edges = vec![Edge::new("later", "b")];
        let inputs = resolve_inputs("b", &edges, &HashMap::new(), &HashMap::new(), &[]);
        assert!(inputs.is_empty());
    }

    #[test]
    fn test_input_node_falls_back_to_initial_inputs() {
        let nodes = vec![Node::new("input-2", kind::INPUT)
            .with_param("type", serde_json::json!("Number"))];
        let mut initial = HashMap::new();
        initial.insert(
            "input_2".to_string(),
            InputValue::Raw(serde_json::json!("forty-two")),
        );

        let inputs = resolve_inputs("input-2", &[], &HashMap::new(), &initial, &nodes);
        assert_eq!(inputs["input"], serde_json::json!("forty-two"));
        assert_eq!(inputs["type"], serde_json::json!("Number"));
    }

    #[test]
    fn test_initial_value_configuration_object_is_unwrapped() {
        let initial: HashMap<String, InputValue> = serde_json::from_str(
            r#"{"input_0": {"value": "inner", "type": "Text"}}"#,
        )
        .unwrap();

        // id without separator resolves suffix "0"
        let inputs = resolve_inputs("input1", &[], &HashMap::new(), &initial, &[]);
        assert_eq!(inputs["input"], serde_json::json!("inner"));
        assert_eq!(inputs["type"], serde_json::json!("Text"));
    }

    #[test]
    fn test_non_input_node_never_reads_initial_inputs() {
        let mut initial = HashMap::new();
        initial.insert(
            "input_1".to_string(),
            InputValue::Raw(serde_json::json!("x")),
        );

        let inputs = resolve_inputs("text-1", &[], &HashMap::new(), &initial, &[]);
        assert!(inputs.is_empty());
    }

    #[test]
    fn test_wired_input_node_ignores_initial_inputs() {
        let edges = vec![Edge::new("up", "input-1")];
        let mut collected = HashMap::new();
        collected.insert("up".to_string(), NodeOutput::from_output("wired"));
        let mut initial = HashMap::new();
        initial.insert(
            "input_1".to_string(),
            InputValue::Raw(serde_json::json!("initial")),
        );

        let inputs = resolve_inputs("input-1", &edges, &collected, &initial, &[]);
        assert_eq!(inputs["input"], serde_json::json!("wired"));
        assert!(!inputs.contains_key("type"));
    }
}
