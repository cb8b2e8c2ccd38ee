use serde::{Deserialize, Serialize};

use crate::request::{ImageInput, InvocationOptions};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzeRequest {
    pub image: Option<ImageInput>,
    pub prompt: Option<String>,
    #[serde(default)]
    pub options: Option<InvocationOptions>,
}

/// Body of the extraction and math endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageRequest {
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractTextResponse {
    pub text: String,
    /// The first 100 characters of the submitted image, for reference.
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessEnvelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, code: Option<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: String,
    pub timestamp: String,
}

/// Truncates an image string for echoing back to the caller.
pub fn image_preview(image: &str) -> String {
    let head: String = image.chars().take(100).collect();
    format!("{head}...")
}
