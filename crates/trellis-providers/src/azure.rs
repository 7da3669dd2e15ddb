use futures::future::BoxFuture;
use reqwest::Client;
use tracing::warn;

use trellis_core::config::AzureConfig;
use trellis_core::traits::{QueryHandler, QueryReply, QueryRequest};

use crate::openai::{build_body, ChatCompletionResponse};

/// Azure OpenAI. Same wire format as OpenAI but a deployment-scoped
/// endpoint and an `api-key` header instead of a Bearer token. The node's
/// model parameter names the deployment.
pub struct AzureHandler {
    http: Client,
    config: AzureConfig,
}

impl AzureHandler {
    pub fn new(config: AzureConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

impl QueryHandler for AzureHandler {
    fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply> {
        Box::pin(async move {
            let Some(api_key) = request
                .credentials
                .clone()
                .or_else(|| self.config.api_key.clone())
            else {
                return QueryReply::fault("Azure OpenAI API key not configured");
            };

            let Some(resource) = self.config.resource.clone() else {
                return QueryReply::fault("Azure OpenAI resource not configured");
            };

            let Some(deployment) = request.model.clone() else {
                return QueryReply::fault("Azure OpenAI deployment not specified");
            };

            let url = format!(
                "https://{}.openai.azure.com/openai/deployments/{}/chat/completions?api-version={}",
                resource, deployment, self.config.api_version
            );

            // Deployment rides in the URL, not the body.
            let mut body = build_body(&request);
            body.model = None;

            let response = match self
                .http
                .post(&url)
                .header("api-key", api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(vendor = "azure", error = %e, "Provider request failed");
                    return QueryReply::fault(format!("Azure OpenAI request failed: {}", e));
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
                    None => QueryReply::fault("Azure OpenAI returned an empty completion"),
                },
                Err(e) => QueryReply::fault(format!("Azure OpenAI response parse error: {}", e)),
            }
        })
    }
}
