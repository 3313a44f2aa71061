//! Capability gates as extractors.
//!
//! Each gate first authenticates like [`AuthenticatedUser`] (401), then
//! rejects with 403 before the handler body runs.

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use sapi_core::auth::Capability;
use sapi_core::auth::policy::require;
use sapi_core::models::auth::{IdentityContext, UserId};

use super::auth::AuthenticatedUser;
use crate::AppState;
use crate::error::AppError;

async fn gated(
    parts: &mut Parts,
    state: &AppState,
    capability: Capability,
) -> Result<IdentityContext, AppError> {
    let AuthenticatedUser(ctx) = AuthenticatedUser::from_request_parts(parts, state).await?;
    require(&ctx, capability)?;
    Ok(ctx)
}

/// Caller holds `MODERATOR` or `ADMIN`.
#[derive(Debug, Clone)]
pub struct ModeratorUser(pub IdentityContext);

impl FromRequestParts<AppState> for ModeratorUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        gated(parts, state, Capability::Moderator).await.map(ModeratorUser)
    }
}

/// Caller holds `ADMIN`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub IdentityContext);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        gated(parts, state, Capability::Admin).await.map(AdminUser)
    }
}

/// The `{id}` path segment, which must be the caller's own id.
#[derive(Debug, Clone)]
pub struct OwnPath(pub UserId);

impl FromRequestParts<AppState> for OwnPath {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(ctx) = AuthenticatedUser::from_request_parts(parts, state).await?;
        let Path(user_id) = Path::<UserId>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Validation(format!("Missing or wrong id: {e}")))?;
        require(&ctx, Capability::SelfOnly(user_id))?;
        Ok(OwnPath(user_id))
    }
}
