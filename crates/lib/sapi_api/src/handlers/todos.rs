//! Todo handlers. Every todo is reachable only by its owner.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use sapi_core::auth::Capability;
use sapi_core::auth::policy::require;
use sapi_core::models::auth::IdentityContext;
use sapi_core::models::todo::{NewTodo, Todo, TodoId, TodoUpdate};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{TodoListMeta, TodoListParams, TodoListResponse, TodoRequest, TodoResponse};

/// Load a todo and check the caller owns it.
async fn owned_todo(state: &AppState, ctx: &IdentityContext, todo_id: TodoId) -> AppResult<Todo> {
    let todo = state
        .store
        .get_todo(todo_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No such task".into()))?;
    require(ctx, Capability::SelfOnly(todo.owner_id))?;
    Ok(todo)
}

/// `GET /todos?filter=all|completed|inWork`
pub async fn list_todos_handler(
    State(state): State<AppState>,
    AuthenticatedUser(ctx): AuthenticatedUser,
    Query(params): Query<TodoListParams>,
) -> AppResult<Json<TodoListResponse>> {
    let list = state.store.list_todos(ctx.user_id, params.filter).await?;
    let total_amount = list.todos.len() as i64;
    Ok(Json(TodoListResponse {
        data: list.todos.into_iter().map(TodoResponse::from).collect(),
        info: list.summary.into(),
        meta: TodoListMeta { total_amount },
    }))
}

/// `POST /todos`
pub async fn create_todo_handler(
    State(state): State<AppState>,
    AuthenticatedUser(ctx): AuthenticatedUser,
    Json(body): Json<TodoRequest>,
) -> AppResult<(StatusCode, Json<TodoResponse>)> {
    body.validate_new()?;
    let new = NewTodo {
        title: body.title.unwrap_or_default(),
        done: body.is_done.unwrap_or(false),
    };
    let todo = state.store.create_todo(ctx.user_id, &new).await?;
    info!(todo_id = todo.id, owner_id = ctx.user_id, "task created");
    Ok((StatusCode::CREATED, Json(todo.into())))
}

/// `GET /todos/{id}`
pub async fn get_todo_handler(
    State(state): State<AppState>,
    AuthenticatedUser(ctx): AuthenticatedUser,
    Path(todo_id): Path<TodoId>,
) -> AppResult<Json<TodoResponse>> {
    Ok(Json(owned_todo(&state, &ctx, todo_id).await?.into()))
}

/// `PUT /todos/{id}`
pub async fn update_todo_handler(
    State(state): State<AppState>,
    AuthenticatedUser(ctx): AuthenticatedUser,
    Path(todo_id): Path<TodoId>,
    Json(body): Json<TodoRequest>,
) -> AppResult<Json<TodoResponse>> {
    body.validate_update()?;
    owned_todo(&state, &ctx, todo_id).await?;
    let update = TodoUpdate {
        title: body.title,
        done: body.is_done,
    };
    let todo = state.store.update_todo(todo_id, &update).await?;
    info!(todo_id, "task updated");
    Ok(Json(todo.into()))
}

/// `DELETE /todos/{id}`
pub async fn delete_todo_handler(
    State(state): State<AppState>,
    AuthenticatedUser(ctx): AuthenticatedUser,
    Path(todo_id): Path<TodoId>,
) -> AppResult<StatusCode> {
    owned_todo(&state, &ctx, todo_id).await?;
    state.store.delete_todo(todo_id).await?;
    info!(todo_id, "task deleted");
    Ok(StatusCode::OK)
}
