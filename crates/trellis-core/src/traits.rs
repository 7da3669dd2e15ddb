use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::Workflow;
use crate::run::{ExecutionRecord, ExecutionUpdate};

/// One chat turn of a vendor-agnostic query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }
}

/// A vendor-agnostic LLM request assembled by the node executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Per-node API key; takes precedence over the handler's configured key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl QueryRequest {
    /// The concatenated system turns, if any.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == TurnRole::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// The user turns in order.
    pub fn user_turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.messages.iter().filter(|m| m.role == TurnRole::User)
    }
}

/// A handler's reply. Failures are reported in-band: the engine treats
/// `error = true` as a node failure regardless of transport-level status,
/// with `content` carrying the vendor's reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReply {
    pub content: String,
    #[serde(default)]
    pub error: bool,
}

impl QueryReply {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: false,
        }
    }

    pub fn fault(reason: impl Into<String>) -> Self {
        Self {
            content: reason.into(),
            error: true,
        }
    }
}

/// Query handler — one per LLM vendor.
///
/// Implementations own their transport concerns (timeouts, retries); the
/// engine imposes none of its own.
pub trait QueryHandler: Send + Sync + 'static {
    fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply>;
}

/// Persistence collaborator boundary.
///
/// The engine reads workflows and writes execution records through this
/// trait only; it never writes back into a workflow document.
pub trait ExecutionStore: Send + Sync + 'static {
    /// Look up a workflow by id, scoped to its owner.
    fn find_workflow(&self, id: &str, user_id: &str) -> Result<Option<Workflow>>;

    /// Insert a freshly created execution record (status `in_progress`).
    fn insert_execution(&self, record: &ExecutionRecord) -> Result<()>;

    /// Apply the single terminal update to an execution record.
    fn finalize_execution(&self, id: &str, update: &ExecutionUpdate) -> Result<()>;
}
