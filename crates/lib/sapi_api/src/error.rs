//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sapi_core::auth::AuthError;
use sapi_core::store::StoreError;
use thiserror::Error;
use tracing::{debug, error};

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// The one message every rejected access token gets.
pub const INVALID_TOKEN: &str = "Invalid token";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The refresh token is gone or expired; the client must sign in again.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::SessionExpired(m) => {
                (StatusCode::UNAUTHORIZED, "session_expired", m.as_str())
            }
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::SessionInvalidated => {
                // The reason stays server-side.
                debug!(reason = %e, "access token rejected");
                AppError::Unauthorized(INVALID_TOKEN.into())
            }
            AuthError::InsufficientRole => AppError::Forbidden("not enough rights".into()),
            AuthError::RefreshExpired => AppError::SessionExpired(
                "Invalid credentials: token is expired - must auth again".into(),
            ),
            AuthError::RefreshSuperseded => {
                AppError::Unauthorized("Invalid refresh token".into())
            }
            AuthError::Infrastructure(msg) => AppError::Internal(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound("No such record".into()),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Corrupt(_) | StoreError::Db(_) => AppError::Internal(e.to_string()),
        }
    }
}
