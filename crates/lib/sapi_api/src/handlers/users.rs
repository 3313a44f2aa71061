//! Self-service user handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use sapi_core::models::auth::UserId;
use sapi_core::models::user::User;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::access::OwnPath;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{PasswordRequest, ProfileUpdateRequest, UserResponse};

pub(crate) async fn load_user(state: &AppState, user_id: UserId) -> AppResult<User> {
    state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No such user".into()))
}

/// `GET /user/profile`
pub async fn get_profile_handler(
    State(state): State<AppState>,
    AuthenticatedUser(ctx): AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(load_user(&state, ctx.user_id).await?.into()))
}

/// `PUT /user/profile`
pub async fn update_profile_handler(
    State(state): State<AppState>,
    AuthenticatedUser(ctx): AuthenticatedUser,
    Json(body): Json<ProfileUpdateRequest>,
) -> AppResult<Json<UserResponse>> {
    body.validate()?;
    let user = state
        .store
        .update_profile(ctx.user_id, &body.into())
        .await?;
    info!(user_id = user.id, "profile updated");
    Ok(Json(user.into()))
}

/// `PUT /user/profile/reset-password`
pub async fn reset_password_handler(
    State(state): State<AppState>,
    AuthenticatedUser(ctx): AuthenticatedUser,
    Json(body): Json<PasswordRequest>,
) -> AppResult<StatusCode> {
    body.validate()?;
    let password_hash = state.auth.hasher().hash(&body.password).await?;
    state
        .store
        .set_password_hash(ctx.user_id, &password_hash)
        .await?;
    info!(user_id = ctx.user_id, "password changed");
    Ok(StatusCode::OK)
}

/// `GET /users/{id}`: only the user themself.
pub async fn get_user_handler(
    State(state): State<AppState>,
    OwnPath(user_id): OwnPath,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(load_user(&state, user_id).await?.into()))
}
