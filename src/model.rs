use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{error::InvocationError, request::InvocationRequest};

/// Reply of a successful invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InvocationResult {
    /// Text of the first choice, empty when the reply carried none.
    pub content: String,
    /// Model id reported by the remote endpoint.
    pub model: String,
    /// Token accounting block, in whatever shape the endpoint sent it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    /// The full remote reply, kept for diagnostics.
    #[serde(rename = "rawResponse")]
    pub raw_response: Value,
}

/// A vision-capable model that the engine can invoke.
///
/// Implementors perform exactly one remote call per [`VisionModel::invoke`]
/// and do not retry.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Model id placed in every composed request.
    fn model_id(&self) -> &str;

    /// Sends one composed request and returns the reply or a classified failure.
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResult, InvocationError>;
}
