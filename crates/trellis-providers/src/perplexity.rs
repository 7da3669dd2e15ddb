use futures::future::BoxFuture;
use reqwest::Client;

use trellis_core::config::ProviderConfig;
use trellis_core::traits::{QueryHandler, QueryReply, QueryRequest};

use crate::openai::{build_body, chat_completion};

const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";

/// Perplexity speaks the OpenAI chat-completions wire format.
pub struct PerplexityHandler {
    http: Client,
    config: ProviderConfig,
}

impl PerplexityHandler {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

impl QueryHandler for PerplexityHandler {
    fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply> {
        Box::pin(async move {
            let Some(api_key) = request
                .credentials
                .clone()
                .or_else(|| self.config.api_key.clone())
            else {
                return QueryReply::fault("Perplexity API key not configured");
            };

            let url = self
                .config
                .base_url
                .clone()
                .unwrap_or_else(|| PERPLEXITY_API_URL.to_string());

            let body = build_body(&request);
            chat_completion(&self.http, &url, &api_key, &body, "Perplexity").await
        })
    }
}
