use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value, json};

use crate::{
    config::DashScopeSettings,
    error::InvocationError,
    model::{InvocationResult, VisionModel},
    request::InvocationRequest,
};

/// Invoker for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiVisionClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiVisionClient {
    pub fn new(settings: &DashScopeSettings) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            api_key: settings.api_key.clone(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.vision_model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, body: &Value) -> Result<Value, InvocationError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| InvocationError::unknown(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error_response(status, &text));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| InvocationError::unknown(e.to_string()))
    }
}

#[async_trait]
impl VisionModel for OpenAiVisionClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResult, InvocationError> {
        let body = chat_completion_body(&request);
        let reply = self.send(&body).await?;
        parse_chat_completion(reply, request.model())
    }
}

/// Builds the chat-completions body. Caller options are merged last, so they
/// override `model` and `messages` if they name them.
pub fn chat_completion_body(request: &InvocationRequest) -> Value {
    let mut body = Map::new();
    body.insert("model".to_string(), json!(request.model()));
    body.insert(
        "messages".to_string(),
        json!([{ "role": "user", "content": request.content() }]),
    );
    body.extend(request.options().clone());
    Value::Object(body)
}

/// Extracts the first choice's text, the reported model and usage from a reply.
pub fn parse_chat_completion(
    reply: Value,
    requested_model: &str,
) -> Result<InvocationResult, InvocationError> {
    if !reply.is_object() {
        return Err(InvocationError::unknown(format!(
            "Malformed chat completion reply: expected a JSON object, got {reply}"
        )));
    }

    if !reply.get("choices").is_some_and(Value::is_array) {
        return Err(InvocationError::unknown(
            "Malformed chat completion reply: missing `choices` array",
        ));
    }

    let content = reply
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let model = reply
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(requested_model)
        .to_string();
    let usage = reply.get("usage").filter(|u| !u.is_null()).cloned();

    Ok(InvocationResult {
        content,
        model,
        usage,
        raw_response: reply,
    })
}

/// Maps a non-2xx reply onto an [`InvocationError`].
///
/// Understands the OpenAI error envelope `{"error": {"message", "type", "code"}}`.
/// A string or numeric `code` is kept; anything else leaves the error unclassified.
pub fn classify_error_response(status: StatusCode, body: &str) -> InvocationError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let envelope = parsed
        .as_ref()
        .map(|v| v.get("error").unwrap_or(v))
        .filter(|v| v.is_object());

    let code = envelope.and_then(|e| e.get("code")).and_then(|c| match c {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    let remote_message = envelope
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| match &parsed {
            // JSON without a string message: keep whatever the endpoint put under `error`
            Some(value) => match value.get("error").filter(|e| !e.is_null()).unwrap_or(value) {
                Value::String(text) => Some(text.clone()),
                other => Some(other.to_string()),
            },
            None => (!body.trim().is_empty()).then(|| body.trim().to_string()),
        });

    let message = match remote_message {
        Some(msg) => format!("{} {}", status.as_u16(), msg),
        None => format!("{} status code (no body)", status.as_u16()),
    };

    log::debug!("remote endpoint answered {status}: {body}");

    InvocationError::new(message, code, parsed)
}
