use crate::error::VisionError;

/// Mime type assumed for raw base64 payloads. The bytes are never sniffed.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

const DATA_URI_IMAGE_PREFIX: &str = "data:image/";

/// A caller supplied image, classified by the shape of its string form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageReference<'a> {
    /// An `http://` or `https://` URL, fetched by the remote endpoint.
    RemoteUrl(&'a str),
    /// A `data:image/...` URI that already declares its mime type.
    DataUri(&'a str),
    /// Bare base64 with no declared mime type.
    RawPayload(&'a str),
}

impl<'a> ImageReference<'a> {
    /// Classifies `input`, checking URL, then data URI, then the base64 alphabet.
    ///
    /// The order matters: a URL-like string that misses both prefixes falls
    /// through to the base64 test and is rejected there.
    pub fn classify(input: &'a str) -> Result<Self, VisionError> {
        if input.starts_with("http://") || input.starts_with("https://") {
            return Ok(Self::RemoteUrl(input));
        }

        if input.starts_with(DATA_URI_IMAGE_PREFIX) {
            return Ok(Self::DataUri(input));
        }

        if is_base64_alphabet(input) {
            return Ok(Self::RawPayload(input));
        }

        Err(VisionError::InvalidImageFormat)
    }

    /// Returns the canonical string the remote endpoint receives as `image_url.url`.
    pub fn into_transport(self) -> String {
        match self {
            Self::RemoteUrl(url) => url.to_string(),
            Self::DataUri(uri) => uri.to_string(),
            Self::RawPayload(payload) => format!("data:{DEFAULT_IMAGE_MIME};base64,{payload}"),
        }
    }
}

/// Normalizes one image reference into its transportable form.
pub fn normalize_image(input: &str) -> Result<String, VisionError> {
    ImageReference::classify(input).map(ImageReference::into_transport)
}

fn is_base64_alphabet(input: &str) -> bool {
    !input.is_empty()
        && input
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}
