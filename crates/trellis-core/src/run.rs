//! Run-scoped types: execution requests, per-node results, and the
//! durable execution record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The authenticated caller on whose behalf a run executes.
///
/// Supplied by the identity collaborator; the engine trusts it as given and
/// performs no authorization logic itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// A caller-supplied initial input: either a bare value or the
/// configuration-object form `{ "value": ... }`, whose inner value is what
/// the input node receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Wrapped {
        value: Value,
        #[serde(flatten)]
        extra: serde_json::Map<String, Value>,
    },
    Raw(Value),
}

impl InputValue {
    /// The effective value, unwrapping the configuration-object form.
    pub fn value(&self) -> &Value {
        match self {
            InputValue::Wrapped { value, .. } => value,
            InputValue::Raw(value) => value,
        }
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        InputValue::Raw(value)
    }
}

/// One execution request: initial inputs keyed `input_<index>` plus the
/// run mode (opaque to the engine, defaulted to `"standard"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub inputs: HashMap<String, InputValue>,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "standard".to_string()
}

impl Default for ExecutionRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionRequest {
    pub fn new() -> Self {
        Self {
            inputs: HashMap::new(),
            mode: default_mode(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), InputValue::Raw(value));
        self
    }
}

/// The output record a node produces: a JSON object carrying at minimum an
/// `"output"` field. Failures carry `"error"` alongside an
/// `"Error: ..."`-prefixed output so downstream consumers still receive a
/// syntactically valid record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeOutput {
    fields: serde_json::Map<String, Value>,
}

impl NodeOutput {
    /// A record with only an `"output"` field.
    pub fn from_output(value: impl Into<Value>) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("output".to_string(), value.into());
        Self { fields }
    }

    /// The normalized failure record: `{error, output: "Error: <msg>"}`.
    pub fn from_error(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = serde_json::Map::new();
        fields.insert("error".to_string(), Value::String(message.clone()));
        fields.insert(
            "output".to_string(),
            Value::String(format!("Error: {}", message)),
        );
        Self { fields }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The `"output"` field as a display string ("" when absent).
    pub fn output_text(&self) -> String {
        match self.fields.get("output") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// The error message when this record represents a failure.
    pub fn error(&self) -> Option<&str> {
        self.fields.get("error").and_then(|v| v.as_str())
    }

    pub fn fields(&self) -> &serde_json::Map<String, Value> {
        &self.fields
    }
}

/// success | error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// Lifecycle status of a persisted execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    InProgress,
    Completed,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::InProgress => "in_progress",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Error => "error",
        }
    }
}

/// Per-node outcome accumulated into the execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRunRecord {
    pub status: RunStatus,
    /// Wall-clock seconds spent executing the node.
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<NodeOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeRunRecord {
    pub fn success(execution_time: f64, output: NodeOutput) -> Self {
        Self {
            status: RunStatus::Success,
            execution_time,
            output: Some(output),
            error: None,
        }
    }

    pub fn error(execution_time: f64, message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            execution_time,
            output: None,
            error: Some(message.into()),
        }
    }
}

/// Public result entry for an output-type node, keyed `output_<suffix>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEntry {
    pub output: String,
    #[serde(rename = "type")]
    pub output_type: String,
    pub execution_time: f64,
    pub status: RunStatus,
    pub node_id: String,
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The aggregate result returned to the caller of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub outputs: IndexMap<String, OutputEntry>,
    pub execution_time: f64,
    pub status: RunStatus,
    /// The realized node-id order.
    pub execution_path: Vec<String>,
    pub node_results: IndexMap<String, NodeRunRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The durable, replayable record of one execution.
///
/// Created with status `in_progress` at run start and finalized exactly
/// once at run end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub inputs: ExecutionRequest,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, OutputEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub node_results: IndexMap<String, NodeRunRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The single terminal update applied to an execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    pub completed_at: DateTime<Utc>,
    pub execution_time: f64,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, OutputEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub node_results: IndexMap<String, NodeRunRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
