use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Code attached to failures that could not be classified.
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// A failed remote invocation.
#[derive(Clone, Debug, Error, PartialEq, Serialize)]
#[error("{message}")]
pub struct InvocationError {
    pub message: String,
    /// Code reported by the remote endpoint, or [`UNKNOWN_ERROR`].
    pub code: String,
    /// Structured error body returned by the remote endpoint, if any.
    pub details: Option<Value>,
}

impl InvocationError {
    pub fn new(message: impl Into<String>, code: Option<String>, details: Option<Value>) -> Self {
        Self {
            message: message.into(),
            code: code.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            details,
        }
    }

    /// An unclassified failure with no remote details.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(message, None, None)
    }

    pub fn is_unknown(&self) -> bool {
        self.code == UNKNOWN_ERROR
    }
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Invalid image input format. Expected URL or base64 string.")]
    InvalidImageFormat,

    #[error("At least one image is required.")]
    NoImages,

    #[error(transparent)]
    Remote(#[from] InvocationError),
}

impl VisionError {
    pub fn code(&self) -> &str {
        match self {
            VisionError::InvalidImageFormat => "INVALID_IMAGE_FORMAT",
            VisionError::NoImages => "NO_IMAGES",
            VisionError::Remote(err) => &err.code,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            VisionError::Remote(err) => err.details.as_ref(),
            _ => None,
        }
    }

    /// True when the failure looks server side rather than caused by the input.
    pub fn is_server_error(&self) -> bool {
        self.code() == UNKNOWN_ERROR
    }
}
