//! Relay between HTTP callers and a multimodal chat-completions model.
//!
//! Images arrive as URLs, data URIs or bare base64. They are normalized
//! ([`image`]), composed with an instruction into one request ([`request`]),
//! sent to the remote model ([`client`]) and the reply is reshaped per task
//! ([`engine`]): general analysis, text extraction and math-problem analysis.

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod model;
pub mod request;
pub mod server;

pub use client::OpenAiVisionClient;
pub use config::Settings;
pub use engine::{MathAnalysis, VisionEngine};
pub use error::{InvocationError, UNKNOWN_ERROR, VisionError};
pub use image::{ImageReference, normalize_image};
pub use model::{InvocationResult, VisionModel};
pub use request::{ContentPart, ImageInput, InvocationOptions, InvocationRequest};
