//! Token verification as an extractor.
//!
//! Every protected handler takes [`AuthenticatedUser`] (or a gate built on
//! it) as an argument, so the verified identity reaches the handler as a
//! value and a handler without one cannot be reached anonymously.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use sapi_core::models::auth::IdentityContext;
use tracing::debug;

use crate::AppState;
use crate::error::{AppError, INVALID_TOKEN};

/// The verified caller.
///
/// Extraction reads `Authorization: Bearer <token>` and runs the full check
/// (signature, expiry, session version, blocked flag) before the handler
/// body runs. Any failure rejects with the same 401.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub IdentityContext);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            debug!(path = %parts.uri.path(), "missing bearer token");
            return Err(AppError::Unauthorized(INVALID_TOKEN.into()));
        };
        let ctx = state.auth.verify(&token).await?;
        Ok(AuthenticatedUser(ctx))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}
