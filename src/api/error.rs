//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::DatabaseError;
use crate::pipeline::comparison::ComparisonError;
use crate::pipeline::processor::ProcessingError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Caller identity required")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("No findings could be extracted")]
    NoFindings,
    #[error("Narrative service unavailable: {0}")]
    Upstream(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "OWNER_REQUIRED",
                "Caller identity required".to_string(),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::NoFindings => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "NO_FINDINGS",
                "No findings could be extracted from the submitted documents".to_string(),
            ),
            ApiError::Upstream(detail) => {
                tracing::warn!(detail, "Narrative service failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "NARRATIVE_UNAVAILABLE",
                    "The narrative service could not complete the request".to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::NoFindingsExtracted => ApiError::NoFindings,
        }
    }
}

impl From<ComparisonError> for ApiError {
    fn from(err: ComparisonError) -> Self {
        match err {
            ComparisonError::TooFewReports(_) => ApiError::BadRequest(err.to_string()),
            ComparisonError::NotFound(id) => ApiError::NotFound(format!("Summary {id} not found")),
            ComparisonError::Storage(e) => ApiError::Internal(e.to_string()),
            ComparisonError::Narrative(e) => ApiError::Upstream(e.to_string()),
            ComparisonError::Parse(detail) => ApiError::Upstream(detail),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
