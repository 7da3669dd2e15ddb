use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use trellis_core::config::ProviderConfig;
use trellis_core::traits::{ChatTurn, QueryHandler, QueryReply, QueryRequest, TurnRole};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiHandler {
    http: Client,
    config: ProviderConfig,
}

impl OpenAiHandler {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

// Chat-completions wire types, shared with the other OpenAI-compatible
// vendors (Perplexity, xAI) and Azure.
#[derive(Serialize)]
pub(crate) struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Serialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Deserialize)]
pub(crate) struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Deserialize)]
pub(crate) struct ChoiceMessage {
    pub content: Option<String>,
}

/// Convert engine turns to the chat-completions shape. Empty system turns
/// are dropped.
pub(crate) fn convert_turns(messages: &[ChatTurn]) -> Vec<ApiMessage> {
    messages
        .iter()
        .filter(|m| !(m.role == TurnRole::System && m.content.is_empty()))
        .map(|m| ApiMessage {
            role: match m.role {
                TurnRole::System => "system".to_string(),
                TurnRole::User => "user".to_string(),
            },
            content: m.content.clone(),
        })
        .collect()
}

/// Build the request body for an OpenAI-compatible vendor.
pub(crate) fn build_body(request: &QueryRequest) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: request.model.clone(),
        messages: convert_turns(&request.messages),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

/// POST a chat-completions request and fold every failure into a fault.
pub(crate) async fn chat_completion(
    http: &Client,
    url: &str,
    api_key: &str,
    body: &ChatCompletionRequest,
    label: &str,
) -> QueryReply {
    let response = match http.post(url).bearer_auth(api_key).json(body).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(vendor = label, error = %e, "Provider request failed");
            return QueryReply::fault(format!("{} request failed: {}", label, e));
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

    match response.json::<ChatCompletionResponse>().await {
        Ok(parsed) => match parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
        {
            Some(content) => QueryReply::ok(content),
            None => QueryReply::fault(format!("{} returned an empty completion", label)),
        },
        Err(e) => QueryReply::fault(format!("{} response parse error: {}", label, e)),
    }
}

impl QueryHandler for OpenAiHandler {
    fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply> {
        Box::pin(async move {
            let Some(api_key) = request
                .credentials
                .clone()
                .or_else(|| self.config.api_key.clone())
            else {
                return QueryReply::fault("OpenAI API key not configured");
            };

            let url = self
                .config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_API_URL.to_string());

            let body = build_body(&request);
            chat_completion(&self.http, &url, &api_key, &body, "OpenAI").await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_turns_drops_empty_system() {
        let turns = vec![ChatTurn::system(""), ChatTurn::user("hi")];
        let converted = convert_turns(&turns);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "user");
    }

    #[test]
    fn test_convert_turns_keeps_nonempty_system() {
        let turns = vec![ChatTurn::system("Be terse."), ChatTurn::user("hi")];
        let converted = convert_turns(&turns);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "system");
    }

    #[test]
    fn test_body_omits_absent_fields() {
        let request = QueryRequest {
            model: Some("gpt-3.5-turbo".to_string()),
            messages: vec![ChatTurn::user("hi")],
            ..Default::default()
        };
        let body = build_body(&request);
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("temperature"));
        assert!(!json.contains("max_tokens"));
        assert!(json.contains("gpt-3.5-turbo"));
    }

    #[tokio::test]
    async fn test_missing_key_is_in_band_fault() {
        let handler = OpenAiHandler::new(ProviderConfig::default());
        let reply = handler
            .handle(QueryRequest {
                messages: vec![ChatTurn::user("hi")],
                ..Default::default()
            })
            .await;
        assert!(reply.error);
        assert!(reply.content.contains("not configured"));
    }
}
