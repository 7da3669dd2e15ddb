use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Node-kind tags recognized by the engine.
///
/// Anything else degrades to a placeholder output at execution time rather
/// than failing the run.
pub mod kind {
    pub const INPUT: &str = "input";
    pub const OUTPUT: &str = "output";
    pub const TEXT: &str = "text";
    pub const DOCUMENT_TO_TEXT: &str = "document-to-text";
    pub const OPENAI: &str = "openai";
    pub const ANTHROPIC: &str = "anthropic";
    pub const GEMINI: &str = "gemini";
    pub const COHERE: &str = "cohere";
    pub const PERPLEXITY: &str = "perplexity";
    pub const XAI: &str = "xai";
    pub const AWS: &str = "aws";
    pub const AZURE: &str = "azure";

    /// The eight LLM provider tags.
    pub const PROVIDERS: [&str; 8] = [
        OPENAI, ANTHROPIC, GEMINI, COHERE, PERPLEXITY, XAI, AWS, AZURE,
    ];
}

/// A node in a workflow graph.
///
/// `kind` is the authored type tag (serialized as `type`); `data.params`
/// carries the type-specific configuration: prompt text, model name,
/// temperature, credentials, and so on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the graph.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: NodeData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data: NodeData::default(),
        }
    }

    /// Set a configuration parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.params.insert(key.into(), value);
        self
    }

    pub fn is_input(&self) -> bool {
        self.kind == kind::INPUT
    }

    pub fn is_output(&self) -> bool {
        self.kind == kind::OUTPUT
    }

    /// Read a string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.data.params.get(key).and_then(|v| v.as_str())
    }

    /// Display name: the `nodeName` param, falling back to the kind tag.
    pub fn display_name(&self) -> &str {
        self.param_str("nodeName").unwrap_or(&self.kind)
    }

    /// Numeric suffix of the id: the part after the first `-`, or `"0"`
    /// when the id has no separator. `input-3` → `3`, `output1` → `0`.
    pub fn id_suffix(&self) -> &str {
        id_suffix(&self.id)
    }
}

/// Suffix of a node id after the first `-`, else `"0"`.
pub fn id_suffix(id: &str) -> &str {
    match id.split_once('-') {
        Some((_, rest)) => rest,
        None => "0",
    }
}

/// Fix up authored input nodes: every `input` node gets a `type` param
/// (default `"Text"`) and a `nodeName` (`Input <n>`). Returns the number
/// of nodes that were changed.
pub fn normalize_input_nodes(nodes: &mut [Node]) -> usize {
    let mut fixed = 0;
    for node in nodes.iter_mut().filter(|n| n.kind == kind::INPUT) {
        let mut changed = false;

        let needs_type = !matches!(
            node.data.params.get("type"),
            Some(serde_json::Value::String(s)) if !s.is_empty()
        );
        if needs_type {
            node.data
                .params
                .insert("type".to_string(), serde_json::Value::String("Text".into()));
            changed = true;
        }

        let needs_name = !matches!(
            node.data.params.get("nodeName"),
            Some(serde_json::Value::String(s)) if !s.is_empty()
        );
        if needs_name {
            let name = format!("Input {}", id_suffix(&node.id));
            node.data
                .params
                .insert("nodeName".to_string(), serde_json::Value::String(name));
            changed = true;
        }

        if changed {
            fixed += 1;
        }
    }
    fixed
}

/// A directed connection routing one node's named output field into
/// another node's named input field.
///
/// Both endpoints should reference existing node ids; dangling edges are
/// tolerated (the resolver ignores them) but never fabricate a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "sourceHandle", default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(rename = "targetHandle", default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_handles(
        mut self,
        source_handle: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        self.source_handle = Some(source_handle.into());
        self.target_handle = Some(target_handle.into());
        self
    }

    /// The output field read from the source node (default `"output"`).
    pub fn source_field(&self) -> &str {
        self.source_handle.as_deref().unwrap_or("output")
    }

    /// The input field written on the target node (default `"input"`).
    pub fn target_field(&self) -> &str {
        self.target_handle.as_deref().unwrap_or("input")
    }
}

/// A persisted workflow: the graph snapshot plus ownership metadata.
///
/// The execution engine only ever reads a workflow; all mutation goes
/// through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The portable graph definition used for export/import: the workflow
/// document with internal identity fields stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl From<Workflow> for WorkflowDefinition {
    fn from(w: Workflow) -> Self {
        Self {
            name: w.name,
            description: w.description,
            nodes: w.nodes,
            edges: w.edges,
        }
    }
}
