//! Polymorphic node dispatch.
//!
//! Node kinds map to [`NodeBehavior`] capabilities through a registry, so
//! new node types (notably new LLM vendors) register independently instead
//! of growing a conditional chain. The executor itself never fails: every
//! behavior error is normalized into an error output record, and an
//! unregistered kind degrades to a placeholder output.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use trellis_core::error::Result;
use trellis_core::graph::{kind, NodeData};
use trellis_core::run::NodeOutput;
use trellis_core::traits::QueryHandler;

use crate::behaviors::{DocumentToText, LlmBehavior, PassThrough, StaticText, VendorProfile};

/// Everything a behavior needs to run one node: the node's configured
/// params, its resolved inputs, and the run mode.
pub struct NodeContext {
    pub params: serde_json::Map<String, Value>,
    pub inputs: HashMap<String, Value>,
    pub mode: String,
}

/// One node-kind capability.
pub trait NodeBehavior: Send + Sync + 'static {
    fn execute(&self, ctx: NodeContext) -> BoxFuture<'_, Result<NodeOutput>>;
}

/// Registry of node behaviors keyed by kind tag.
pub struct NodeExecutor {
    behaviors: HashMap<String, Arc<dyn NodeBehavior>>,
}

impl NodeExecutor {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
        }
    }

    /// A registry with the non-provider built-ins: `input`, `output`,
    /// `text`, `document-to-text`.
    pub fn with_defaults() -> Self {
        let mut executor = Self::new();
        executor.register(kind::INPUT, Arc::new(PassThrough::input()));
        executor.register(kind::OUTPUT, Arc::new(PassThrough::output()));
        executor.register(kind::TEXT, Arc::new(StaticText));
        executor.register(kind::DOCUMENT_TO_TEXT, Arc::new(DocumentToText));
        executor
    }

    /// Register a behavior for a kind tag (replacing any previous one).
    pub fn register(&mut self, tag: impl Into<String>, behavior: Arc<dyn NodeBehavior>) {
        self.behaviors.insert(tag.into(), behavior);
    }

    /// Register an LLM vendor behavior backed by a query handler.
    pub fn register_provider(&mut self, profile: VendorProfile, handler: Arc<dyn QueryHandler>) {
        self.register(profile.tag, Arc::new(LlmBehavior::new(profile, handler)));
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.behaviors.contains_key(tag)
    }

    /// Execute one node. Never fails: behavior errors come back as
    /// `{error, output: "Error: …"}` records so downstream consumers still
    /// receive a syntactically valid output.
    pub async fn execute(
        &self,
        kind: &str,
        data: &NodeData,
        inputs: HashMap<String, Value>,
        mode: &str,
    ) -> NodeOutput {
        let Some(behavior) = self.behaviors.get(kind) else {
            warn!(node_kind = %kind, "Unknown node type");
            return NodeOutput::from_output(format!("Unknown node type: {}", kind));
        };

        let ctx = NodeContext {
            params: data.params.clone(),
            inputs,
            mode: mode.to_string(),
        };

        match behavior.execute(ctx).await {
            Ok(output) => output,
            Err(e) => NodeOutput::from_error(e.to_string()),
        }
    }
}

impl Default for NodeExecutor {
    fn default() -> Self {
        Self::new()
    }
}
