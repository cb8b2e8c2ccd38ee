use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::VisionError, image::normalize_image};

/// Invocation parameters forwarded verbatim to the remote endpoint
/// (`temperature`, `max_tokens`, or anything else it understands).
pub type InvocationOptions = Map<String, Value>;

/// One image reference or an ordered list of them.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ImageInput {
    Single(String),
    Multiple(Vec<String>),
}

impl ImageInput {
    pub fn as_slice(&self) -> &[String] {
        match self {
            ImageInput::Single(image) => std::slice::from_ref(image),
            ImageInput::Multiple(images) => images,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ImageInput::Single(image) => image.is_empty(),
            ImageInput::Multiple(_) => false,
        }
    }
}

impl From<String> for ImageInput {
    fn from(image: String) -> Self {
        ImageInput::Single(image)
    }
}

impl From<&str> for ImageInput {
    fn from(image: &str) -> Self {
        ImageInput::Single(image.to_string())
    }
}

impl From<Vec<String>> for ImageInput {
    fn from(images: Vec<String>) -> Self {
        ImageInput::Multiple(images)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// A content part of the single user message sent to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

/// A composed model invocation.
///
/// Only [`InvocationRequest::compose`] builds one, so the content always holds
/// at least one image part followed by exactly one text part.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationRequest {
    model: String,
    content: Vec<ContentPart>,
    options: InvocationOptions,
}

/// Lightweight description of a request, used for logging without cloning image data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMetadata {
    pub model: String,
    pub image_count: usize,
    pub prompt_chars: usize,
}

impl InvocationRequest {
    /// Normalizes every image in order and appends `prompt` as the final text part.
    ///
    /// Fails as a whole if any image cannot be classified or if there are no images.
    pub fn compose(
        model: impl Into<String>,
        images: &ImageInput,
        prompt: &str,
        options: InvocationOptions,
    ) -> Result<Self, VisionError> {
        let images = images.as_slice();
        if images.is_empty() {
            return Err(VisionError::NoImages);
        }

        let mut content = images
            .iter()
            .map(|image| {
                normalize_image(image).map(|url| ContentPart::ImageUrl {
                    image_url: ImageUrl { url },
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        content.push(ContentPart::Text {
            text: prompt.to_string(),
        });

        Ok(Self {
            model: model.into(),
            content,
            options,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn content(&self) -> &[ContentPart] {
        &self.content
    }

    pub fn options(&self) -> &InvocationOptions {
        &self.options
    }

    /// The canonical image strings, in input order.
    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
            ContentPart::Text { .. } => None,
        })
    }

    pub fn prompt(&self) -> &str {
        match self.content.last() {
            Some(ContentPart::Text { text }) => text,
            _ => "",
        }
    }

    pub fn metadata(&self) -> RequestMetadata {
        RequestMetadata {
            model: self.model.clone(),
            image_count: self.content.len() - 1,
            prompt_chars: self.prompt().chars().count(),
        }
    }
}
