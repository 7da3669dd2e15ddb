use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use trellis_core::config::ProviderConfig;
use trellis_core::traits::{QueryHandler, QueryReply, QueryRequest};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicHandler {
    http: Client,
    config: ProviderConfig,
}

impl AnthropicHandler {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl QueryHandler for AnthropicHandler {
    fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply> {
        Box::pin(async move {
            let Some(api_key) = request
                .credentials
                .clone()
                .or_else(|| self.config.api_key.clone())
            else {
                return QueryReply::fault("Anthropic API key not configured");
            };

            let Some(model) = request.model.clone() else {
                return QueryReply::fault("Anthropic model not specified");
            };

            let url = self
                .config
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_API_URL.to_string());

            // System text rides as a top-level field, not a message turn.
            let system = request.system_text().filter(|s| !s.is_empty());
            let messages = request
                .user_turns()
                .map(|m| ApiMessage {
                    role: "user".to_string(),
                    content: m.content.clone(),
                })
                .collect();

            let body = AnthropicRequest {
                model,
                max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                system,
                messages,
            };

            let response = match self
                .http
                .post(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(vendor = "anthropic", error = %e, "Provider request failed");
                    return QueryReply::fault(format!("Anthropic request failed: {}", e));
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return QueryReply::fault(format!("HTTP {}: {}", status, text));
            }

            match response.json::<AnthropicResponse>().await {
                Ok(parsed) => match parsed.content.into_iter().find_map(|b| b.text) {
                    Some(text) => QueryReply::ok(text),
                    None => QueryReply::fault("Anthropic returned an empty message"),
                },
                Err(e) => QueryReply::fault(format!("Anthropic response parse error: {}", e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::traits::ChatTurn;

    #[tokio::test]
    async fn test_missing_key_is_in_band_fault() {
        let handler = AnthropicHandler::new(ProviderConfig::default());
        let reply = handler
            .handle(QueryRequest {
                model: Some("claude-3-sonnet".to_string()),
                messages: vec![ChatTurn::user("hi")],
                ..Default::default()
            })
            .await;
        assert!(reply.error);
        assert!(reply.content.contains("Anthropic"));
    }

    #[tokio::test]
    async fn test_missing_model_is_in_band_fault() {
        let handler = AnthropicHandler::new(ProviderConfig {
            api_key: Some("sk-test".to_string()),
            base_url: None,
        });
        let reply = handler
            .handle(QueryRequest {
                messages: vec![ChatTurn::user("hi")],
                ..Default::default()
            })
            .await;
        assert!(reply.error);
        assert!(reply.content.contains("model"));
    }
}
