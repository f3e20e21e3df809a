//! # API Error Types
//!
//! `AppError` implements `IntoResponse` and renders every failure as
//! `{"error": {"code", "message", "details"?}}`. Domain errors from
//! `mc-core`, `mc-state` and `mc-presence` convert into it with `?`.
//!
//! Messages for 500 and 503 responses are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use mc_presence::LocationStoreError;
use mc_state::JobStatusError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    pub message: String,
    /// Additional context, present only for some client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Job, roster or location absent (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Well-formed input that fails domain rules (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Body or query string could not be decoded (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// Location cache or document store unreachable (503).
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::UpstreamUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            Self::UpstreamUnavailable(_) => {
                tracing::error!(error = %self, "upstream dependency unavailable");
                "A backing service is unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<mc_core::ValidationError> for AppError {
    fn from(err: mc_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<JobStatusError> for AppError {
    fn from(err: JobStatusError) -> Self {
        match err {
            JobStatusError::UnknownStatus(_) => Self::Validation(err.to_string()),
            // A posting that is already `Done` is no longer a pending job
            // that could be marked.
            JobStatusError::AlreadyTerminal | JobStatusError::InvalidTransition { .. } => {
                Self::NotFound(err.to_string())
            }
        }
    }
}

impl From<LocationStoreError> for AppError {
    fn from(err: LocationStoreError) -> Self {
        match err {
            LocationStoreError::Unavailable(_) => Self::UpstreamUnavailable(err.to_string()),
            LocationStoreError::Encode(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::UpstreamUnavailable(err.to_string())
            }
            other => Self::Internal(format!("database error: {other}")),
        }
    }
}
