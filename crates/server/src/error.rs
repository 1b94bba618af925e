// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Analyzer not available at {0}")]
    AnalyzerUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, ErrorResponse::new(msg.clone()))
            }
            ApiError::NotFound(msg) => {
                tracing::debug!(message = %msg, "Not found");
                (StatusCode::NOT_FOUND, ErrorResponse::new(msg.clone()))
            }
            ApiError::PayloadTooLarge(msg) => {
                tracing::warn!(message = %msg, "Upload exceeds body limit");
                (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorResponse::with_details("Upload too large", msg.clone()),
                )
            }
            ApiError::UnsupportedMediaType(content_type) => {
                tracing::warn!(content_type = %content_type, "Unsupported content type");
                (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    ErrorResponse::with_details(
                        "Unsupported content type",
                        "Expected multipart/form-data or application/json",
                    ),
                )
            }
            ApiError::AnalyzerUnavailable(path) => {
                tracing::error!(analyzer = %path, "Analyzer not found");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Analysis service not available", path.clone()),
                )
            }
            ApiError::Io(e) => {
                tracing::error!(error = %e, "IO error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("IO error", e.to_string()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

impl ApiError {
    /// Map an extractor rejection, keeping body-limit failures as 413.
    pub fn from_rejection(status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(message)
        } else {
            ApiError::BadRequest(message)
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
