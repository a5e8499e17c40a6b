//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;
use crate::probe::ProbeError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Create a 429 Too Many Requests error.
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS", message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        let message = err.to_string();
        match err {
            ProbeError::InvalidInput(_) => ApiError::bad_request(message),
            ProbeError::Throttled => ApiError::too_many_requests(message),
            ProbeError::ExecutionTimeout { .. } => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "PROBE_TIMEOUT", message)
            }
            ProbeError::ExecutionFailure { .. } => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "PROBE_FAILED", message)
            }
            ProbeError::DataError(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INVALID_OUTPUT", message)
            }
            ProbeError::Internal(_) => ApiError::internal(message),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Configuration(msg) => ApiError::bad_request(msg),
            Error::ApiError(msg) => ApiError::bad_request(msg),
            Error::Rclone(e) => {
                tracing::error!("rclone error: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "RCLONE_ERROR", e.to_string())
            }
            Error::Serialization(e) => {
                tracing::error!("Unreadable rclone output: {}", e);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INVALID_OUTPUT",
                    format!("Unreadable rclone output: {}", e),
                )
            }
            _ => {
                tracing::error!("Unexpected error: {}", err);
                ApiError::internal("An unexpected error occurred")
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
