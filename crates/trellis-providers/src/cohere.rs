use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use trellis_core::config::ProviderConfig;
use trellis_core::traits::{QueryHandler, QueryReply, QueryRequest};

const COHERE_API_URL: &str = "https://api.cohere.com/v1/chat";

pub struct CohereHandler {
    http: Client,
    config: ProviderConfig,
}

impl CohereHandler {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct CohereRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CohereResponse {
    #[serde(default)]
    text: Option<String>,
}

impl QueryHandler for CohereHandler {
    fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply> {
        Box::pin(async move {
            let Some(api_key) = request
                .credentials
                .clone()
                .or_else(|| self.config.api_key.clone())
            else {
                return QueryReply::fault("Cohere API key not configured");
            };

            let url = self
                .config
                .base_url
                .clone()
                .unwrap_or_else(|| COHERE_API_URL.to_string());

            // Cohere's chat endpoint takes a single message string.
            let message = request
                .user_turns()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");

            let body = CohereRequest {
                model: request.model.clone(),
                message,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
            };

            let response = match self
                .http
                .post(&url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(vendor = "cohere", error = %e, "Provider request failed");
                    return QueryReply::fault(format!("Cohere request failed: {}", e));
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

            match response.json::<CohereResponse>().await {
                Ok(CohereResponse { text: Some(text) }) => QueryReply::ok(text),
                Ok(_) => QueryReply::fault("Cohere returned an empty reply"),
                Err(e) => QueryReply::fault(format!("Cohere response parse error: {}", e)),
            }
        })
    }
}
