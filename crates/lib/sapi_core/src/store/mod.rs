//! Persistence layer.
//!
//! The authentication core only ever talks to [`AuthStore`]; the CRUD
//! handlers use [`UserStore`] and [`TodoStore`]. Two backends implement all
//! three: [`postgres::PgStore`] and [`memory::MemoryStore`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{Credential, Identity, RefreshTokenRecord, SessionState, UserId};
use crate::models::todo::{NewTodo, Todo, TodoFilter, TodoId, TodoList, TodoUpdate};
use crate::models::user::{NewUser, ProfileUpdate, User, UserFieldUpdate, UserPage, UserQuery};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage contract of the authentication core.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Password digest and identity for a login, if the login exists.
    async fn load_credential(&self, login: &str) -> StoreResult<Option<Credential>>;

    async fn load_identity(&self, user_id: UserId) -> StoreResult<Option<Identity>>;

    /// Current session version and blocked flag, read together.
    ///
    /// Must observe every previously completed [`AuthStore::invalidate_sessions`].
    async fn session_state(&self, user_id: UserId) -> StoreResult<Option<SessionState>>;

    /// Atomic upsert of the identity's single refresh token.
    async fn store_refresh_token(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Replace the refresh token only if `current_hash` is still registered.
    ///
    /// Returns `false` when another writer got there first.
    async fn rotate_refresh_token(
        &self,
        user_id: UserId,
        current_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn lookup_refresh_token(&self, user_id: UserId)
    -> StoreResult<Option<RefreshTokenRecord>>;

    /// In one atomic step: bump the session version by exactly 1 and delete
    /// the refresh token. Returns `false` if the identity does not exist.
    async fn invalidate_sessions(&self, user_id: UserId) -> StoreResult<bool>;
}

/// Account management.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] on a duplicate login or email.
    ///
    /// With [`NewUser::admin_if_first`], at most one of any number of
    /// concurrent calls on an empty store creates an admin.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>>;

    async fn list_users(&self, query: &UserQuery) -> StoreResult<UserPage>;

    async fn update_profile(&self, user_id: UserId, update: &ProfileUpdate) -> StoreResult<User>;

    async fn set_password_hash(&self, user_id: UserId, password_hash: &str) -> StoreResult<()>;

    async fn apply_field_update(
        &self,
        user_id: UserId,
        update: &UserFieldUpdate,
    ) -> StoreResult<User>;

    async fn delete_user(&self, user_id: UserId) -> StoreResult<()>;
}

/// Todo persistence, always scoped by owner on listing.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn create_todo(&self, owner_id: UserId, todo: &NewTodo) -> StoreResult<Todo>;

    async fn get_todo(&self, todo_id: TodoId) -> StoreResult<Option<Todo>>;

    async fn list_todos(&self, owner_id: UserId, filter: TodoFilter) -> StoreResult<TodoList>;

    async fn update_todo(&self, todo_id: TodoId, update: &TodoUpdate) -> StoreResult<Todo>;

    async fn delete_todo(&self, todo_id: TodoId) -> StoreResult<()>;
}

/// Everything the HTTP layer needs from a backend.
pub trait Store: AuthStore + UserStore + TodoStore {}

impl<T: AuthStore + UserStore + TodoStore> Store for T {}
