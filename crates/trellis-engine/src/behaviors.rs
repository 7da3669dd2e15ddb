//! Built-in node behaviors.
//!
//! The four structural kinds (`input`, `output`, `text`,
//! `document-to-text`) plus one generic LLM behavior parameterized by a
//! [`VendorProfile`] describing each vendor's defaults and capabilities.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_core::graph::kind;
use trellis_core::run::NodeOutput;
use trellis_core::traits::{ChatTurn, QueryHandler, QueryRequest};

use crate::executor::{NodeBehavior, NodeContext};
use crate::template;

/// Pass-through of the resolved `"input"` value. Used by both `input`
/// nodes (empty-string default) and terminal `output` nodes ("No input").
pub struct PassThrough {
    missing: &'static str,
}

impl PassThrough {
    pub fn input() -> Self {
        Self { missing: "" }
    }

    pub fn output() -> Self {
        Self { missing: "No input" }
    }
}

impl NodeBehavior for PassThrough {
    fn execute(&self, ctx: NodeContext) -> BoxFuture<'_, Result<NodeOutput>> {
        let value = ctx
            .inputs
            .get("input")
            .cloned()
            .unwrap_or_else(|| Value::String(self.missing.to_string()));
        Box::pin(async move { Ok(NodeOutput::from_output(value)) })
    }
}

/// Returns the node's configured static text; upstream inputs are ignored.
pub struct StaticText;

impl NodeBehavior for StaticText {
    fn execute(&self, ctx: NodeContext) -> BoxFuture<'_, Result<NodeOutput>> {
        let text = ctx
            .params
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("Sample text")
            .to_string();
        Box::pin(async move { Ok(NodeOutput::from_output(text)) })
    }
}

/// Simulated document transform with bounded latency. A real extraction
/// pipeline is an external collaborator.
pub struct DocumentToText;

impl NodeBehavior for DocumentToText {
    fn execute(&self, ctx: NodeContext) -> BoxFuture<'_, Result<NodeOutput>> {
        let document = ctx
            .inputs
            .get("document")
            .map(template::display_value)
            .unwrap_or_else(|| "No document".to_string());
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(NodeOutput::from_output(format!(
                "Processed document: {}",
                document
            )))
        })
    }
}

/// Per-vendor request shape: which request fields the vendor accepts and
/// what its defaults are.
#[derive(Debug, Clone, Copy)]
pub struct VendorProfile {
    /// Node-kind tag this profile dispatches on.
    pub tag: &'static str,
    /// Label used in error messages.
    pub label: &'static str,
    pub default_model: Option<&'static str>,
    /// Model name reported in the output record when the vendor takes no
    /// model parameter.
    pub reported_model: Option<&'static str>,
    pub system_turn: bool,
    pub temperature: bool,
    pub max_tokens: bool,
}

pub const OPENAI: VendorProfile = VendorProfile {
    tag: kind::OPENAI,
    label: "OpenAI API",
    default_model: Some("gpt-3.5-turbo"),
    reported_model: None,
    system_turn: true,
    temperature: true,
    max_tokens: true,
};

pub const ANTHROPIC: VendorProfile = VendorProfile {
    tag: kind::ANTHROPIC,
    label: "Anthropic API",
    default_model: Some("claude-3-sonnet"),
    reported_model: None,
    system_turn: true,
    temperature: false,
    max_tokens: true,
};

pub const GEMINI: VendorProfile = VendorProfile {
    tag: kind::GEMINI,
    label: "Gemini API",
    default_model: Some("gemini-pro"),
    reported_model: None,
    system_turn: false,
    temperature: true,
    max_tokens: false,
};

pub const COHERE: VendorProfile = VendorProfile {
    tag: kind::COHERE,
    label: "Cohere API",
    default_model: Some("command"),
    reported_model: None,
    system_turn: false,
    temperature: true,
    max_tokens: true,
};

pub const PERPLEXITY: VendorProfile = VendorProfile {
    tag: kind::PERPLEXITY,
    label: "Perplexity API",
    default_model: Some("sonar-medium"),
    reported_model: None,
    system_turn: false,
    temperature: false,
    max_tokens: false,
};

pub const XAI: VendorProfile = VendorProfile {
    tag: kind::XAI,
    label: "xAI API",
    default_model: None,
    reported_model: Some("xai-chat"),
    system_turn: false,
    temperature: false,
    max_tokens: false,
};

pub const AWS: VendorProfile = VendorProfile {
    tag: kind::AWS,
    label: "AWS Bedrock",
    default_model: Some("amazon-titan"),
    reported_model: None,
    system_turn: false,
    temperature: false,
    max_tokens: false,
};

pub const AZURE: VendorProfile = VendorProfile {
    tag: kind::AZURE,
    label: "Azure OpenAI",
    default_model: Some("gpt-35-turbo"),
    reported_model: None,
    system_turn: true,
    temperature: true,
    max_tokens: true,
};

/// All vendor profiles, in registration order.
pub const VENDORS: [VendorProfile; 8] = [
    OPENAI, ANTHROPIC, GEMINI, COHERE, PERPLEXITY, XAI, AWS, AZURE,
];

/// Typed view of an LLM node's configuration params, with the vendor's
/// defaults applied. Parsed at execution time so malformed values fail the
/// node rather than the process.
#[derive(Debug, Clone)]
struct LlmParams {
    model: Option<String>,
    prompt: String,
    system: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    api_key: Option<String>,
}

fn extract_params(
    profile: &VendorProfile,
    params: &serde_json::Map<String, Value>,
) -> Result<LlmParams> {
    let str_param = |key: &str| {
        params
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let temperature = if profile.temperature {
        Some(numeric_f32(params.get("temperature"), 0.7, "temperature")?)
    } else {
        None
    };
    let max_tokens = if profile.max_tokens {
        Some(numeric_u32(params.get("max_tokens"), 1000, "max_tokens")?)
    } else {
        None
    };

    Ok(LlmParams {
        model: str_param("model").or_else(|| profile.default_model.map(str::to_string)),
        prompt: str_param("prompt").unwrap_or_default(),
        system: str_param("system").unwrap_or_default(),
        temperature,
        max_tokens,
        api_key: str_param("apiKey"),
    })
}

/// Accept a JSON number or a numeric string; anything else fails the node.
fn numeric_f32(value: Option<&Value>, default: f32, name: &str) -> Result<f32> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or(default as f64) as f32),
        Some(Value::String(s)) => s.trim().parse::<f32>().map_err(|_| TrellisError::Param {
            name: name.to_string(),
            message: format!("expected a number, got {:?}", s),
        }),
        Some(other) => Err(TrellisError::Param {
            name: name.to_string(),
            message: format!("expected a number, got {}", other),
        }),
    }
}

fn numeric_u32(value: Option<&Value>, default: u32, name: &str) -> Result<u32> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => Ok(n
            .as_u64()
            .map(|v| v as u32)
            .or_else(|| n.as_f64().map(|v| v as u32))
            .unwrap_or(default)),
        Some(Value::String(s)) => s.trim().parse::<u32>().map_err(|_| TrellisError::Param {
            name: name.to_string(),
            message: format!("expected an integer, got {:?}", s),
        }),
        Some(other) => Err(TrellisError::Param {
            name: name.to_string(),
            message: format!("expected an integer, got {}", other),
        }),
    }
}

/// Generic LLM node: extracts typed params, substitutes templates into
/// prompt and system text, assembles a vendor-agnostic request, and
/// dispatches to the vendor's query handler. A handler-reported fault
/// fails the node with the vendor's message.
pub struct LlmBehavior {
    profile: VendorProfile,
    handler: Arc<dyn QueryHandler>,
}

impl LlmBehavior {
    pub fn new(profile: VendorProfile, handler: Arc<dyn QueryHandler>) -> Self {
        Self { profile, handler }
    }
}

impl NodeBehavior for LlmBehavior {
    fn execute(&self, ctx: NodeContext) -> BoxFuture<'_, Result<NodeOutput>> {
        Box::pin(async move {
            let params = extract_params(&self.profile, &ctx.params)?;

            let prompt = template::substitute(&params.prompt, &ctx.inputs);
            let system = template::substitute(&params.system, &ctx.inputs);

            let mut messages = Vec::new();
            if self.profile.system_turn {
                messages.push(ChatTurn::system(system));
            }
            messages.push(ChatTurn::user(prompt));

            let request = QueryRequest {
                model: params.model.clone(),
                messages,
                temperature: params.temperature,
                max_tokens: params.max_tokens,
                credentials: params.api_key,
            };

            debug!(
                vendor = self.profile.tag,
                model = params.model.as_deref().unwrap_or(""),
                "Dispatching provider query"
            );

            let reply = self.handler.handle(request).await;
            if reply.error {
                return Err(TrellisError::Provider {
                    provider: self.profile.label.to_string(),
                    message: reply.content,
                });
            }

            let mut output = NodeOutput::from_output(reply.content.clone());
            output.insert("response", Value::String(reply.content));
            let reported = self
                .profile
                .reported_model
                .map(str::to_string)
                .or(params.model);
            if let Some(model) = reported {
                output.insert("model", Value::String(model));
            }
            Ok(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use trellis_core::traits::{QueryReply, TurnRole};

    /// Scripted handler capturing the request it receives.
    struct Scripted {
        reply: QueryReply,
        seen: Mutex<Option<QueryRequest>>,
    }

    impl Scripted {
        fn ok(content: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: QueryReply::ok(content),
                seen: Mutex::new(None),
            })
        }

        fn fault(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: QueryReply::fault(reason),
                seen: Mutex::new(None),
            })
        }
    }

    impl QueryHandler for Scripted {
        fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply> {
            *self.seen.lock().unwrap() = Some(request);
            let reply = self.reply.clone();
            Box::pin(async move { reply })
        }
    }

    fn ctx(params: serde_json::Value, inputs: &[(&str, serde_json::Value)]) -> NodeContext {
        NodeContext {
            params: params.as_object().cloned().unwrap_or_default(),
            inputs: inputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            mode: "standard".to_string(),
        }
    }

    #[tokio::test]
    async fn test_pass_through_defaults() {
        let input = PassThrough::input();
        let out = input.execute(ctx(serde_json::json!({}), &[])).await.unwrap();
        assert_eq!(out.output_text(), "");

        let output = PassThrough::output();
        let out = output
            .execute(ctx(serde_json::json!({}), &[]))
            .await
            .unwrap();
        assert_eq!(out.output_text(), "No input");
    }

    #[tokio::test]
    async fn test_pass_through_forwards_value() {
        let behavior = PassThrough::output();
        let out = behavior
            .execute(ctx(
                serde_json::json!({}),
                &[("input", serde_json::json!("carried"))],
            ))
            .await
            .unwrap();
        assert_eq!(out.output_text(), "carried");
    }

    #[tokio::test]
    async fn test_static_text_ignores_inputs() {
        let behavior = StaticText;
        let out = behavior
            .execute(ctx(
                serde_json::json!({"text": "configured"}),
                &[("input", serde_json::json!("ignored"))],
            ))
            .await
            .unwrap();
        assert_eq!(out.output_text(), "configured");
    }

    #[tokio::test]
    async fn test_static_text_default() {
        let behavior = StaticText;
        let out = behavior.execute(ctx(serde_json::json!({}), &[])).await.unwrap();
        assert_eq!(out.output_text(), "Sample text");
    }

    #[tokio::test]
    async fn test_document_to_text() {
        let behavior = DocumentToText;
        let out = behavior
            .execute(ctx(
                serde_json::json!({}),
                &[("document", serde_json::json!("report.pdf"))],
            ))
            .await
            .unwrap();
        assert_eq!(out.output_text(), "Processed document: report.pdf");
    }

    #[tokio::test]
    async fn test_llm_substitutes_prompt_and_system() {
        let handler = Scripted::ok("answer");
        let behavior = LlmBehavior::new(OPENAI, handler.clone());
        let out = behavior
            .execute(ctx(
                serde_json::json!({
                    "prompt": "Summarize {{input}}",
                    "system": "Act as {{role}}",
                }),
                &[
                    ("input", serde_json::json!("the text")),
                    ("role", serde_json::json!("an editor")),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(out.output_text(), "answer");
        assert_eq!(out.get("response"), Some(&serde_json::json!("answer")));
        assert_eq!(out.get("model"), Some(&serde_json::json!("gpt-3.5-turbo")));

        let seen = handler.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.messages.len(), 2);
        assert_eq!(seen.messages[0].role, TurnRole::System);
        assert_eq!(seen.messages[0].content, "Act as an editor");
        assert_eq!(seen.messages[1].content, "Summarize the text");
        assert_eq!(seen.temperature, Some(0.7));
        assert_eq!(seen.max_tokens, Some(1000));
    }

    #[tokio::test]
    async fn test_llm_user_only_vendor_sends_single_turn() {
        let handler = Scripted::ok("ok");
        let behavior = LlmBehavior::new(GEMINI, handler.clone());
        behavior
            .execute(ctx(serde_json::json!({"prompt": "hi"}), &[]))
            .await
            .unwrap();

        let seen = handler.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.messages.len(), 1);
        assert_eq!(seen.messages[0].role, TurnRole::User);
        assert_eq!(seen.max_tokens, None);
        assert_eq!(seen.temperature, Some(0.7));
    }

    #[tokio::test]
    async fn test_llm_fault_fails_with_vendor_message() {
        let handler = Scripted::fault("rate limited");
        let behavior = LlmBehavior::new(OPENAI, handler);
        let err = behavior
            .execute(ctx(serde_json::json!({"prompt": "hi"}), &[]))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("OpenAI API"));
        assert!(message.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_non_numeric_temperature_fails_the_node() {
        let handler = Scripted::ok("unreachable");
        let behavior = LlmBehavior::new(OPENAI, handler);
        let err = behavior
            .execute(ctx(
                serde_json::json!({"prompt": "hi", "temperature": "warm"}),
                &[],
            ))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[tokio::test]
    async fn test_numeric_string_temperature_is_accepted() {
        let handler = Scripted::ok("ok");
        let behavior = LlmBehavior::new(OPENAI, handler.clone());
        behavior
            .execute(ctx(
                serde_json::json!({"prompt": "hi", "temperature": "0.2", "max_tokens": "512"}),
                &[],
            ))
            .await
            .unwrap();

        let seen = handler.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.temperature, Some(0.2));
        assert_eq!(seen.max_tokens, Some(512));
    }

    #[tokio::test]
    async fn test_xai_reports_fixed_model() {
        let handler = Scripted::ok("grokked");
        let behavior = LlmBehavior::new(XAI, handler.clone());
        let out = behavior
            .execute(ctx(serde_json::json!({"prompt": "hi"}), &[]))
            .await
            .unwrap();
        assert_eq!(out.get("model"), Some(&serde_json::json!("xai-chat")));

        let seen = handler.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.model, None);
    }

    #[tokio::test]
    async fn test_per_node_api_key_becomes_credentials() {
        let handler = Scripted::ok("ok");
        let behavior = LlmBehavior::new(OPENAI, handler.clone());
        behavior
            .execute(ctx(
                serde_json::json!({"prompt": "hi", "apiKey": "sk-node"}),
                &[],
            ))
            .await
            .unwrap();

        let seen = handler.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.credentials.as_deref(), Some("sk-node"));
    }
}
