//! # sapi_api
//!
//! HTTP API library for sAPI.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod validation;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use sapi_core::auth::{AuthError, AuthService};
use sapi_core::store::Store;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{admin, auth, todos, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// User, todo and session persistence.
    pub store: Arc<dyn Store>,
    /// Authentication core, sharing the same backend.
    pub auth: Arc<AuthService>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the authentication core onto `store`.
    pub fn new<S: Store + 'static>(store: Arc<S>, config: ApiConfig) -> Result<Self, AuthError> {
        let auth = AuthService::new(
            store.clone(),
            config.jwt_secret.as_bytes(),
            &config.auth_settings(),
        )?;
        Ok(Self {
            store,
            auth: Arc::new(auth),
            config,
        })
    }
}

/// Run embedded database migrations.
///
/// Delegates to `sapi_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sapi_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_SIGNUP, post(auth::signup_handler))
        .route(routes::POST_AUTH_SIGNIN, post(auth::signin_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler));

    // Protected routes: every handler takes an identity extractor from `middleware`.
    let protected = Router::new()
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(
            routes::USER_PROFILE,
            get(users::get_profile_handler).put(users::update_profile_handler),
        )
        .route(
            routes::PUT_USER_PROFILE_RESET_PASSWORD,
            put(users::reset_password_handler),
        )
        .route(routes::GET_USERS_ID, get(users::get_user_handler))
        .route(
            routes::TODOS,
            get(todos::list_todos_handler).post(todos::create_todo_handler),
        )
        .route(
            routes::TODOS_ID,
            get(todos::get_todo_handler)
                .put(todos::update_todo_handler)
                .delete(todos::delete_todo_handler),
        )
        .route(routes::GET_ADMIN_USERS, get(admin::list_users_handler))
        .route(
            routes::ADMIN_USERS_ID,
            get(admin::get_user_handler)
                .put(admin::update_user_handler)
                .delete(admin::delete_user_handler),
        )
        .route(routes::POST_ADMIN_USERS_ID_BLOCK, post(admin::block_user_handler))
        .route(
            routes::POST_ADMIN_USERS_ID_UNBLOCK,
            post(admin::unblock_user_handler),
        )
        .route(
            routes::POST_ADMIN_USERS_ID_RIGHTS,
            post(admin::update_rights_handler),
        );

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
