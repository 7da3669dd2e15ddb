use futures::future::BoxFuture;

use trellis_core::config::ProviderConfig;
use trellis_core::traits::{QueryHandler, QueryReply, QueryRequest};

/// AWS Bedrock handler stub.
///
/// Bedrock requires AWS SigV4 request signing which needs the `aws-sigv4`
/// and `aws-credential-types` crates. Until signing support lands, this
/// handler reports a clear in-band fault so Bedrock nodes fail their run
/// step with a usable message instead of a transport error.
pub struct BedrockHandler {
    #[allow(dead_code)]
    config: ProviderConfig,
}

impl BedrockHandler {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

impl QueryHandler for BedrockHandler {
    fn handle(&self, request: QueryRequest) -> BoxFuture<'_, QueryReply> {
        let model = request.model.unwrap_or_else(|| "amazon-titan".to_string());
        Box::pin(async move {
            QueryReply::fault(format!(
                "AWS Bedrock (model: {}) requires SigV4 request signing which is not yet \
                 implemented. Route this node through an OpenAI-compatible gateway or use \
                 another provider node.",
                model
            ))
        })
    }
}
