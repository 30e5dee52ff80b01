//! Request-scoped error taxonomy and its HTTP mapping.
//!
//! Failures from external collaborators are wrapped into one of these kinds at
//! the pipeline boundary; raw provider errors go to the log, never to the
//! caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error kinds surfaced to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad request shape or missing/invalid fields.
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid, or expired credentials.
    #[error("{0}")]
    Auth(String),

    /// Authenticated but not allowed to touch the resource.
    #[error("{0}")]
    Forbidden(String),

    /// Unknown session/document or one not owned by the caller.
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation, e.g. re-registering an email.
    #[error("{0}")]
    Conflict(String),

    /// Unreadable or non-PDF upload.
    #[error("{0}")]
    DocumentParse(String),

    /// An embedding/caption/chat/vector-db/object-store call failed.
    #[error("upstream service error")]
    Upstream(anyhow::Error),
}

impl ApiError {
    /// Wraps an external-collaborator failure, logging the cause.
    pub fn upstream(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{err:#}"), "upstream call failed");
        ApiError::Upstream(err)
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::DocumentParse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        (status, Json(ErrorBody { message })).into_response()
    }
}
