//! Error types for the tarot-reader HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{AccountError, CoordinatorError, PipelineError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Operation not valid in the current state (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// tarot-common error
    #[error("Common error: {0}")]
    Common(#[from] tarot_common::Error),
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let message = err.to_string();
        match err {
            CoordinatorError::EmptyIntention
            | CoordinatorError::NoWallet
            | CoordinatorError::UnknownDeck(_)
            | CoordinatorError::UnknownCard(_)
            | CoordinatorError::InvalidIndex(_)
            | CoordinatorError::Pipeline(PipelineError::NoUserId)
            | CoordinatorError::Pipeline(PipelineError::UnknownDeck(_))
            | CoordinatorError::Account(AccountError::MissingWallet) => {
                ApiError::BadRequest(message)
            }
            CoordinatorError::WrongPhase(_)
            | CoordinatorError::AlreadySelected(_)
            | CoordinatorError::SpreadFull
            | CoordinatorError::AlreadyRevealed(_)
            | CoordinatorError::NotReady { .. }
            | CoordinatorError::Pipeline(PipelineError::Busy) => ApiError::Conflict(message),
            CoordinatorError::Account(_) => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
