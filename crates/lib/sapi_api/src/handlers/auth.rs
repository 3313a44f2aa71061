//! Authentication request handlers.

use std::collections::BTreeSet;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use sapi_core::models::auth::Role;
use sapi_core::models::user::NewUser;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{RefreshRequest, SignInRequest, SignUpRequest, TokenResponse, UserResponse};

/// `POST /auth/signup`: create a new account. The first account is an admin.
pub async fn signup_handler(
    State(state): State<AppState>,
    Json(body): Json<SignUpRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    body.validate()?;

    let password_hash = state.auth.hasher().hash(&body.password).await?;
    let user = state
        .store
        .create_user(NewUser {
            login: body.login,
            username: body.username,
            email: body.email,
            password_hash,
            phone_number: body.phone_number,
            roles: BTreeSet::from([Role::User]),
            admin_if_first: true,
        })
        .await?;

    if user.roles.contains(&Role::Admin) {
        info!(user_id = user.id, "first user granted admin role");
    }
    info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// `POST /auth/signin`: exchange login and password for a token pair.
pub async fn signin_handler(
    State(state): State<AppState>,
    Json(body): Json<SignInRequest>,
) -> AppResult<Json<TokenResponse>> {
    if body.login.is_empty() || body.password.is_empty() {
        return Err(AppError::Validation(
            "Invalid input: login and password are required".into(),
        ));
    }
    let pair = state.auth.sign_in(&body.login, &body.password).await?;
    Ok(Json(pair.into()))
}

/// `POST /auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state.auth.refresh(&body.refresh_token).await?;
    Ok(Json(pair.into()))
}

/// `POST /auth/logout`: invalidate every outstanding session of the caller.
pub async fn logout_handler(
    State(state): State<AppState>,
    AuthenticatedUser(ctx): AuthenticatedUser,
) -> AppResult<StatusCode> {
    state.auth.logout(ctx.user_id).await?;
    Ok(StatusCode::OK)
}
