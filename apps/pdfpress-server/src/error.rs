//! Error types for the pdfpress server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfpress_core::PdfPressError;
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("Compression tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone()),
            ApiError::ToolUnavailable(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TOOL_UNAVAILABLE",
                msg.clone(),
            ),
            ApiError::Compression(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMPRESSION_FAILED",
                msg.clone(),
            ),
            // Callers get a generic message; the cause stays in the server log.
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An unexpected internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<PdfPressError> for ApiError {
    fn from(err: PdfPressError) -> Self {
        match err {
            PdfPressError::Validation(msg) => ApiError::Validation(msg),
            PdfPressError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            PdfPressError::ToolUnavailable(msg) => ApiError::ToolUnavailable(msg),
            PdfPressError::Compression(msg) => ApiError::Compression(msg),
            PdfPressError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}
