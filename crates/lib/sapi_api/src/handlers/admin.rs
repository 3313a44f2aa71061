//! Administrative user handlers.
//!
//! Listing, viewing and blocking need `MODERATOR`; editing, deleting and
//! granting roles need `ADMIN`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use sapi_core::models::auth::{Role, UserId, parse_roles};
use sapi_core::models::user::{SortOrder, UserFieldUpdate, UserQuery, UserSortKey};
use tracing::info;

use super::users::load_user;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::access::{AdminUser, ModeratorUser};
use crate::models::{
    ProfileUpdateRequest, RightsRequest, UserListMeta, UserListParams, UserListResponse,
    UserResponse,
};

const MAX_PAGE: i64 = 100;

fn user_query(params: UserListParams) -> AppResult<UserQuery> {
    let sort_by = match params.sort_by.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("id") => UserSortKey::Id,
        Some("username") => UserSortKey::Username,
        Some("email") => UserSortKey::Email,
        Some(other) => {
            return Err(AppError::Validation(format!("Invalid sortBy: {other}")));
        }
    };
    let sort_order = match params.sort_order.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("none") | Some("asc") => SortOrder::Asc,
        Some("desc") => SortOrder::Desc,
        Some(other) => {
            return Err(AppError::Validation(format!("Invalid sortOrder: {other}")));
        }
    };
    let limit = params.limit.unwrap_or(20);
    if !(1..=MAX_PAGE).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE}"
        )));
    }
    let offset = params.offset.unwrap_or(0);
    if offset < 0 {
        return Err(AppError::Validation("offset must not be negative".into()));
    }
    Ok(UserQuery {
        search: params.search.filter(|s| !s.trim().is_empty()),
        sort_by,
        sort_order,
        blocked: params.is_blocked,
        limit,
        offset,
    })
}

/// `GET /admin/users`: filter, sort and page through all users.
pub async fn list_users_handler(
    State(state): State<AppState>,
    ModeratorUser(_): ModeratorUser,
    Query(params): Query<UserListParams>,
) -> AppResult<Json<UserListResponse>> {
    let query = user_query(params)?;
    let page = state.store.list_users(&query).await?;
    Ok(Json(UserListResponse {
        data: page.users.into_iter().map(UserResponse::from).collect(),
        meta: UserListMeta {
            total_amount: page.total,
            sort_by: query.sort_by.column().to_string(),
            sort_order: query.sort_order.keyword().to_string(),
        },
    }))
}

/// `GET /admin/users/{id}`
pub async fn get_user_handler(
    State(state): State<AppState>,
    ModeratorUser(_): ModeratorUser,
    Path(user_id): Path<UserId>,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(load_user(&state, user_id).await?.into()))
}

async fn set_blocked(state: &AppState, user_id: UserId, blocked: bool) -> AppResult<UserResponse> {
    let user = state
        .store
        .apply_field_update(user_id, &UserFieldUpdate::Blocked(blocked))
        .await?;
    info!(user_id, blocked, "block status changed");
    Ok(user.into())
}

/// `POST /admin/users/{id}/block`: takes effect on the user's next request.
pub async fn block_user_handler(
    State(state): State<AppState>,
    ModeratorUser(_): ModeratorUser,
    Path(user_id): Path<UserId>,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(set_blocked(&state, user_id, true).await?))
}

/// `POST /admin/users/{id}/unblock`
pub async fn unblock_user_handler(
    State(state): State<AppState>,
    ModeratorUser(_): ModeratorUser,
    Path(user_id): Path<UserId>,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(set_blocked(&state, user_id, false).await?))
}

/// `PUT /admin/users/{id}`: edit another user's profile fields.
pub async fn update_user_handler(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(user_id): Path<UserId>,
    Json(body): Json<ProfileUpdateRequest>,
) -> AppResult<Json<UserResponse>> {
    body.validate()?;
    let user = state.store.update_profile(user_id, &body.into()).await?;
    info!(user_id, "profile updated by admin");
    Ok(Json(user.into()))
}

/// `DELETE /admin/users/{id}`
pub async fn delete_user_handler(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(user_id): Path<UserId>,
) -> AppResult<StatusCode> {
    state.store.delete_user(user_id).await?;
    info!(user_id, "user deleted");
    Ok(StatusCode::OK)
}

/// `POST /admin/users/{id}/rights`: replace the role set.
///
/// `USER` is always kept. Outstanding tokens keep their old roles until the
/// user refreshes.
pub async fn update_rights_handler(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(user_id): Path<UserId>,
    Json(body): Json<RightsRequest>,
) -> AppResult<Json<UserResponse>> {
    let mut roles =
        parse_roles(&body.roles).map_err(|e| AppError::Validation(format!("No such field: {e}")))?;
    roles.insert(Role::User);
    let user = state
        .store
        .apply_field_update(user_id, &UserFieldUpdate::Roles(roles))
        .await?;
    info!(user_id, roles = ?user.roles, "rights updated");
    Ok(Json(user.into()))
}
