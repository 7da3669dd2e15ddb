//! LLM vendor query handlers.
//!
//! One handler per vendor, each folding transport errors, non-2xx
//! statuses, missing credentials, and parse failures into an in-band
//! [`QueryReply`] fault — the engine's contract is the `error` flag, never
//! a panic or a transport exception.

pub mod anthropic;
pub mod aws;
pub mod azure;
pub mod cohere;
pub mod gemini;
pub mod openai;
pub mod perplexity;
pub mod xai;

use std::collections::HashMap;
use std::sync::Arc;

use trellis_core::config::ProvidersConfig;
use trellis_core::graph::kind;
use trellis_core::traits::QueryHandler;

pub use anthropic::AnthropicHandler;
pub use aws::BedrockHandler;
pub use azure::AzureHandler;
pub use cohere::CohereHandler;
pub use gemini::GeminiHandler;
pub use openai::OpenAiHandler;
pub use perplexity::PerplexityHandler;
pub use xai::XaiHandler;

/// Registry of query handlers keyed by node-kind tag.
///
/// Built from explicit configuration at construction time; there is no
/// process-global client state. Tests swap in scripted handlers via
/// [`HandlerRegistry::register`].
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn QueryHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Wire all eight vendor handlers from the given configuration.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();
        registry.register(kind::OPENAI, Arc::new(OpenAiHandler::new(config.openai.clone())));
        registry.register(
            kind::ANTHROPIC,
            Arc::new(AnthropicHandler::new(config.anthropic.clone())),
        );
        registry.register(kind::GEMINI, Arc::new(GeminiHandler::new(config.gemini.clone())));
        registry.register(kind::COHERE, Arc::new(CohereHandler::new(config.cohere.clone())));
        registry.register(
            kind::PERPLEXITY,
            Arc::new(PerplexityHandler::new(config.perplexity.clone())),
        );
        registry.register(kind::XAI, Arc::new(XaiHandler::new(config.xai.clone())));
        registry.register(kind::AWS, Arc::new(BedrockHandler::new(config.aws.clone())));
        registry.register(kind::AZURE, Arc::new(AzureHandler::new(config.azure.clone())));
        registry
    }

    pub fn register(&mut self, tag: impl Into<String>, handler: Arc<dyn QueryHandler>) {
        self.handlers.insert(tag.into(), handler);
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn QueryHandler>> {
        self.handlers.get(tag).cloned()
    }

    pub fn tags(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_registers_all_vendors() {
        let registry = HandlerRegistry::from_config(&ProvidersConfig::default());
        for tag in kind::PROVIDERS {
            assert!(registry.get(tag).is_some(), "missing handler for {}", tag);
        }
    }

    #[test]
    fn test_register_overrides() {
        use futures::future::BoxFuture;
        use trellis_core::traits::{QueryReply, QueryRequest};

        struct Stub;
        impl QueryHandler for Stub {
            fn handle(&self, _request: QueryRequest) -> BoxFuture<'_, QueryReply> {
                Box::pin(async { QueryReply::ok("stubbed") })
            }
        }

        let mut registry = HandlerRegistry::from_config(&ProvidersConfig::default());
        registry.register(kind::OPENAI, Arc::new(Stub));
        assert!(registry.get(kind::OPENAI).is_some());
        assert_eq!(registry.tags().len(), 8);
    }
}
