use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;
use crate::services::queue::QueueError;

/// Structured JSON error body returned for all API errors.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// API error taxonomy. Lower-level store/queue failures are translated here
/// and never leak raw to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("error submitting document: {0}")]
    Submission(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(what) => ApiError::Conflict(what),
            StoreError::Database(e) => {
                tracing::error!(error = %e, "database error");
                ApiError::Internal("database operation failed".to_string())
            }
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        tracing::error!(error = %err, "queue error");
        ApiError::Internal("job queue operation failed".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "not found".to_string(),
                    detail: Some(what.clone()),
                },
            ),
            ApiError::Conflict(what) => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: "conflict".to_string(),
                    detail: Some(what.clone()),
                },
            ),
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "validation failed".to_string(),
                    detail: Some(msg.clone()),
                },
            ),
            ApiError::Submission(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "error submitting document".to_string(),
                    detail: Some(msg.clone()),
                },
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "internal server error".to_string(),
                    detail: Some(msg.clone()),
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}
