//! Common error types for the gateway

use axum::{
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid image file type: {got}; allowed types are {allowed}")]
    InvalidImageType { got: String, allowed: String },

    #[error("Invalid image file extension: {got}; allowed extensions are {allowed}")]
    InvalidImageExtension { got: String, allowed: String },

    #[error("Image too large: {size} bytes; maximum allowed size is {max} bytes")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Invalid prompt file type: {got}; allowed types are {allowed}")]
    InvalidPromptType { got: String, allowed: String },

    #[error("Invalid prompt file extension: {got}; allowed extensions are {allowed}")]
    InvalidPromptExtension { got: String, allowed: String },

    #[error("Prompt is not valid UTF-8")]
    PromptNotUtf8,

    #[error("Unsafe prompt. Avoid using characters: <>&;")]
    UnsafePrompt,

    #[error("Prompt too long: {len} characters; maximum allowed length is {max} characters")]
    PromptTooLong { len: usize, max: usize },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Parameter {name} is out of range {min}-{max}")]
    ParameterOutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
    },

    #[error("Too many requests ({scope}). Retry after {retry_after} seconds")]
    QuotaExceeded {
        scope: &'static str,
        retry_after: u64,
    },

    #[error("Service is at capacity. Retry after {retry_after} seconds")]
    Overloaded { retry_after: u64 },

    #[error("Model resource is not ready")]
    ResourceUnavailable,

    #[error("Device memory exhausted during transformation")]
    DeviceMemoryExhausted,

    #[error("Image transformation failed: {0}")]
    Engine(String),

    #[error("Timed out waiting for transformation result")]
    InvokeTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body returned to clients
#[derive(Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl AppError {
    /// HTTP status for each error kind
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidImageType { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidImageExtension { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedImageFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::InvalidPromptType { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidPromptExtension { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PromptNotUtf8 => StatusCode::BAD_REQUEST,
            AppError::UnsafePrompt => StatusCode::BAD_REQUEST,
            AppError::PromptTooLong { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidParameter { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ParameterOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Overloaded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ResourceUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DeviceMemoryExhausted => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvokeTimeout => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Retry-After value in seconds, present on quota and capacity rejections
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::QuotaExceeded { retry_after, .. } => Some(*retry_after),
            AppError::Overloaded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after();

        let body = Json(ErrorBody {
            detail: self.to_string(),
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_error_carries_retry_after() {
        let err = AppError::QuotaExceeded {
            scope: "per_client",
            retry_after: 42,
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.retry_after(), Some(42));
    }

    #[test]
    fn test_validation_statuses() {
        let err = AppError::InvalidImageType {
            got: "text/plain".to_string(),
            allowed: "image/png".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = AppError::ImageTooLarge { size: 11, max: 10 };
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = AppError::UnsupportedImageFormat("not an image".to_string());
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_non_quota_errors_have_no_retry_after() {
        assert_eq!(AppError::UnsafePrompt.retry_after(), None);
        assert_eq!(AppError::ResourceUnavailable.retry_after(), None);
    }
}
