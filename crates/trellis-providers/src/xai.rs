use futures::future::BoxFuture;
use reqwest::Client;

use trellis_core::config::ProviderConfig;
use trellis_core::traits::{QueryHandler, QueryReply, QueryRequest};

use crate::openai::{build_body, chat_completion};

const XAI_API_URL: &str = "https://api.x.ai/v1/chat/completions";
const XAI_DEFAULT_MODEL: &str = "grok-beta";

/// xAI speaks the OpenAI chat-completions wire format. Workflow nodes do
/// not carry a model for this vendor, so the handler fills in the default.
pub struct XaiHandler {
    http: Client,
    config: ProviderConfig,
}

impl XaiHandler {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

impl QueryHandler for XaiHandler {
    fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply> {
        Box::pin(async move {
            let Some(api_key) = request
                .credentials
                .clone()
                .or_else(|| self.config.api_key.clone())
            else {
                return QueryReply::fault("xAI API key not configured");
            };

            let url = self
                .config
                .base_url
                .clone()
                .unwrap_or_else(|| XAI_API_URL.to_string());

            let mut body = build_body(&request);
            if body.model.is_none() {
                body.model = Some(XAI_DEFAULT_MODEL.to_string());
            }
            chat_completion(&self.http, &url, &api_key, &body, "xAI").await
        })
    }
}
