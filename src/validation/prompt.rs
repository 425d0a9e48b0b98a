//! Prompt validation and fail-closed sanitization

use tracing::{error, warn};

use crate::config::PromptConfig;
use crate::error::{AppError, Result};
use crate::validation::{format_allowed, RawUpload};

/// Characters stripped by sanitization; their presence rejects the request
const DISALLOWED: [char; 4] = ['<', '>', '&', ';'];

/// Validate the prompt upload and return the accepted text.
///
/// The type and extension checks only apply when the client declared them; a
/// bare string field carries neither and is checked on content alone. If
/// sanitization would change the stripped text, the whole request is
/// rejected; the sanitized copy is never used in its place.
pub fn validate_prompt(upload: &RawUpload, settings: &PromptConfig) -> Result<String> {
    if let Some(content_type) = upload.content_type.as_deref() {
        if !settings.allowed_types.contains(content_type) {
            let err = AppError::InvalidPromptType {
                got: content_type.to_string(),
                allowed: format_allowed(&settings.allowed_types),
            };
            error!(stage = "validate_prompt", %err, "rejected upload");
            return Err(err);
        }
    }

    if upload.filename.is_some() {
        let extension = upload.extension().unwrap_or_default();
        if !settings.allowed_extensions.contains(&extension) {
            let err = AppError::InvalidPromptExtension {
                got: upload.filename.clone().unwrap_or_default(),
                allowed: format_allowed(&settings.allowed_extensions),
            };
            error!(stage = "validate_prompt", %err, "rejected upload");
            return Err(err);
        }
    }

    let text = std::str::from_utf8(&upload.bytes).map_err(|_| {
        error!(stage = "validate_prompt", "prompt is not valid UTF-8");
        AppError::PromptNotUtf8
    })?;
    let stripped = text.trim();

    let sanitized: String = stripped.chars().filter(|c| !DISALLOWED.contains(c)).collect();
    if sanitized != stripped {
        warn!(stage = "validate_prompt", "prompt contained disallowed characters");
        return Err(AppError::UnsafePrompt);
    }

    let len = stripped.chars().count();
    if len > settings.max_length {
        let err = AppError::PromptTooLong {
            len,
            max: settings.max_length,
        };
        error!(stage = "validate_prompt", %err, "rejected upload");
        return Err(err);
    }

    Ok(stripped.to_string())
}
