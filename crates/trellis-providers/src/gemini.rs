use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use trellis_core::config::ProviderConfig;
use trellis_core::traits::{QueryHandler, QueryReply, QueryRequest};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-pro";

/// Google Gemini native `generateContent` handler.
pub struct GeminiHandler {
    http: Client,
    config: ProviderConfig,
}

impl GeminiHandler {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl QueryHandler for GeminiHandler {
    fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply> {
        Box::pin(async move {
            let Some(api_key) = request
                .credentials
                .clone()
                .or_else(|| self.config.api_key.clone())
            else {
                return QueryReply::fault("Gemini API key not configured");
            };

            let base = self
                .config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_API_BASE.to_string());
            let model = request.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
            let url = format!("{}/models/{}:generateContent?key={}", base, model, api_key);

            let contents = request
                .user_turns()
                .map(|m| GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![GeminiPart {
                        text: m.content.clone(),
                    }],
                })
                .collect();

            let body = GeminiRequest {
                contents,
                generation_config: request
                    .temperature
                    .map(|t| GenerationConfig {
                        temperature: Some(t),
                    }),
            };

            let response = match self.http.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(vendor = "gemini", error = %e, "Provider request failed");
                    return QueryReply::fault(format!("Gemini request failed: {}", e));
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

            match response.json::<GeminiResponse>().await {
                Ok(parsed) => {
                    let text = parsed
                        .candidates
                        .into_iter()
                        .filter_map(|c| c.content)
                        .flat_map(|c| c.parts)
                        .map(|p| p.text)
                        .next();
                    match text {
                        Some(text) => QueryReply::ok(text),
                        None => QueryReply::fault("Gemini returned no candidates"),
                    }
                }
                Err(e) => QueryReply::fault(format!("Gemini response parse error: {}", e)),
            }
        })
    }
}
