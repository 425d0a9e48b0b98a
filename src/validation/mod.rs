//! Input validation and sanitization

pub mod image;
pub mod params;
pub mod prompt;

pub use image::validate_image;
pub use params::validate_params;
pub use prompt::validate_prompt;

use crate::engine::ModelParams;
use ::image::RgbImage;

/// Raw multipart field as received from the client, before any validation
#[derive(Debug, Clone, Default)]
pub struct RawUpload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

impl RawUpload {
    /// Lowercased trailing filename extension, if a filename was declared
    pub fn extension(&self) -> Option<String> {
        self.filename
            .as_ref()
            .and_then(|name| name.rsplit('.').next().map(|ext| ext.to_lowercase()))
    }
}

/// Fully validated request input. Composed only after every validator has
/// returned `Ok`; no partially-validated instance is ever observable.
#[derive(Debug, Clone)]
pub struct ValidatedInput {
    pub image: RgbImage,
    pub prompt: String,
    pub params: ModelParams,
}

pub(crate) fn format_allowed(allowed: &std::collections::HashSet<String>) -> String {
    let mut values: Vec<&str> = allowed.iter().map(String::as_str).collect();
    values.sort_unstable();
    values.join(", ")
}
