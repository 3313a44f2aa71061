//! PostgreSQL backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{AuthStore, StoreError, StoreResult, TodoStore, UserStore};
use crate::models::auth::{
    Credential, Identity, RefreshTokenRecord, Role, SessionState, UserId, parse_roles,
};
use crate::models::todo::{NewTodo, Todo, TodoFilter, TodoId, TodoList, TodoSummary, TodoUpdate};
use crate::models::user::{NewUser, ProfileUpdate, User, UserFieldUpdate, UserPage, UserQuery};

const USER_COLUMNS: &str =
    "id, login, username, email, phone_number, roles, is_blocked, created_at";

type UserRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Vec<String>,
    bool,
    DateTime<Utc>,
);

/// Advisory lock key held for the duration of a signup transaction.
const SIGNUP_LOCK_KEY: i64 = 0x5341_5049_0001;

type TodoRow = (i64, i64, String, bool, DateTime<Utc>);

fn user_from_row(row: UserRow) -> StoreResult<User> {
    let (id, login, username, email, phone_number, roles, blocked, created_at) = row;
    Ok(User {
        id,
        login,
        username,
        email,
        phone_number,
        roles: parse_roles(&roles).map_err(|e| StoreError::Corrupt(format!("user {id}: {e}")))?,
        blocked,
        created_at,
    })
}

fn todo_from_row((id, owner_id, title, done, created_at): TodoRow) -> Todo {
    Todo {
        id,
        owner_id,
        title,
        done,
        created_at,
    }
}

fn role_names<'a>(roles: impl IntoIterator<Item = &'a Role>) -> Vec<String> {
    roles.into_iter().map(|r| r.as_str().to_string()).collect()
}

/// Map unique violations to [`StoreError::Conflict`].
fn conflict_on_unique(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            let what = match db.constraint() {
                Some(c) if c.contains("login") => "login already used",
                Some(c) if c.contains("email") => "email already used",
                _ => "login or email already used",
            };
            StoreError::Conflict(what.into())
        }
        _ => StoreError::Db(e),
    }
}

/// Store backed by a PostgreSQL pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthStore for PgStore {
    async fn load_credential(&self, login: &str) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, (i64, String, Vec<String>, bool, i64)>(
            "SELECT id, password_hash, roles, is_blocked, session_version \
             FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, password_hash, roles, blocked, session_version)| {
            let roles =
                parse_roles(&roles).map_err(|e| StoreError::Corrupt(format!("user {id}: {e}")))?;
            Ok(Credential {
                identity: Identity {
                    id,
                    roles,
                    blocked,
                    session_version,
                },
                password_hash,
            })
        })
        .transpose()
    }

    async fn load_identity(&self, user_id: UserId) -> StoreResult<Option<Identity>> {
        let row = sqlx::query_as::<_, (Vec<String>, bool, i64)>(
            "SELECT roles, is_blocked, session_version FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(roles, blocked, session_version)| {
            Ok(Identity {
                id: user_id,
                roles: parse_roles(&roles)
                    .map_err(|e| StoreError::Corrupt(format!("user {user_id}: {e}")))?,
                blocked,
                session_version,
            })
        })
        .transpose()
    }

    async fn session_state(&self, user_id: UserId) -> StoreResult<Option<SessionState>> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "SELECT session_version, is_blocked FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(session_version, blocked)| SessionState {
            session_version,
            blocked,
        }))
    }

    async fn store_refresh_token(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) \
             DO UPDATE SET token_hash = EXCLUDED.token_hash, expires_at = EXCLUDED.expires_at",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        user_id: UserId,
        current_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET token_hash = $3, expires_at = $4 \
             WHERE user_id = $1 AND token_hash = $2",
        )
        .bind(user_id)
        .bind(current_hash)
        .bind(new_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn lookup_refresh_token(
        &self,
        user_id: UserId,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            "SELECT token_hash, expires_at FROM refresh_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(token_hash, expires_at)| RefreshTokenRecord {
            user_id,
            token_hash,
            expires_at,
        }))
    }

    async fn invalidate_sessions(&self, user_id: UserId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let bumped = sqlx::query("UPDATE users SET session_version = session_version + 1 WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if bumped != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut first_roles = user.roles.clone();
        if user.admin_if_first {
            first_roles.insert(Role::Admin);
        }

        let mut tx = self.pool.begin().await?;

        // Serializes signups, so the emptiness check below sees every
        // committed account.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SIGNUP_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO users (login, username, email, password_hash, phone_number, roles) \
             SELECT $1, $2, $3, $4, $5, \
               CASE WHEN EXISTS (SELECT 1 FROM users) THEN $6 ELSE $7 END \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.login)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.phone_number)
            .bind(role_names(&user.roles))
            .bind(role_names(&first_roles))
            .fetch_one(&mut *tx)
            .await
            .map_err(conflict_on_unique)?;

        tx.commit().await?;
        user_from_row(row)
    }

    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(user_from_row).transpose()
    }

    async fn list_users(&self, query: &UserQuery) -> StoreResult<UserPage> {
        // Sort column and direction come from closed enums, never from input text.
        let filter = "WHERE ($1::text IS NULL \
                        OR username ILIKE '%' || $1 || '%' \
                        OR email ILIKE '%' || $1 || '%') \
                      AND ($2::boolean IS NULL OR is_blocked = $2)";
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users {filter} ORDER BY {} {} LIMIT $3 OFFSET $4",
            query.sort_by.column(),
            query.sort_order.keyword(),
        );

        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&query.search)
            .bind(query.blocked)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM users {filter}"))
            .bind(&query.search)
            .bind(query.blocked)
            .fetch_one(&self.pool)
            .await?;

        let users = rows
            .into_iter()
            .map(user_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(UserPage { users, total })
    }

    async fn update_profile(&self, user_id: UserId, update: &ProfileUpdate) -> StoreResult<User> {
        let sql = format!(
            "UPDATE users SET \
               username = COALESCE($2, username), \
               email = COALESCE($3, email), \
               phone_number = COALESCE($4, phone_number) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .bind(&update.username)
            .bind(&update.email)
            .bind(&update.phone_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(conflict_on_unique)?
            .ok_or(StoreError::NotFound)?;
        user_from_row(row)
    }

    async fn set_password_hash(&self, user_id: UserId, password_hash: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn apply_field_update(
        &self,
        user_id: UserId,
        update: &UserFieldUpdate,
    ) -> StoreResult<User> {
        let query = match update {
            UserFieldUpdate::Roles(roles) => {
                let sql = format!("UPDATE users SET roles = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(user_id)
                    .bind(role_names(roles))
                    .fetch_optional(&self.pool)
                    .await?
            }
            UserFieldUpdate::Blocked(blocked) => {
                let sql =
                    format!("UPDATE users SET is_blocked = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(user_id)
                    .bind(blocked)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        user_from_row(query.ok_or(StoreError::NotFound)?)
    }

    async fn delete_user(&self, user_id: UserId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl TodoStore for PgStore {
    async fn create_todo(&self, owner_id: UserId, todo: &NewTodo) -> StoreResult<Todo> {
        let row = sqlx::query_as::<_, TodoRow>(
            "INSERT INTO todos (owner_id, title, is_done) VALUES ($1, $2, $3) \
             RETURNING id, owner_id, title, is_done, created_at",
        )
        .bind(owner_id)
        .bind(&todo.title)
        .bind(todo.done)
        .fetch_one(&self.pool)
        .await?;
        Ok(todo_from_row(row))
    }

    async fn get_todo(&self, todo_id: TodoId) -> StoreResult<Option<Todo>> {
        let row = sqlx::query_as::<_, TodoRow>(
            "SELECT id, owner_id, title, is_done, created_at FROM todos WHERE id = $1",
        )
        .bind(todo_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(todo_from_row))
    }

    async fn list_todos(&self, owner_id: UserId, filter: TodoFilter) -> StoreResult<TodoList> {
        let done = match filter {
            TodoFilter::All => None,
            TodoFilter::Completed => Some(true),
            TodoFilter::InWork => Some(false),
        };
        let rows = sqlx::query_as::<_, TodoRow>(
            "SELECT id, owner_id, title, is_done, created_at FROM todos \
             WHERE owner_id = $1 AND ($2::boolean IS NULL OR is_done = $2) \
             ORDER BY id",
        )
        .bind(owner_id)
        .bind(done)
        .fetch_all(&self.pool)
        .await?;

        let (all, completed) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_done) FROM todos WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(TodoList {
            todos: rows.into_iter().map(todo_from_row).collect(),
            summary: TodoSummary {
                all,
                completed,
                in_work: all - completed,
            },
        })
    }

    async fn update_todo(&self, todo_id: TodoId, update: &TodoUpdate) -> StoreResult<Todo> {
        let row = sqlx::query_as::<_, TodoRow>(
            "UPDATE todos SET title = COALESCE($2, title), is_done = COALESCE($3, is_done) \
             WHERE id = $1 RETURNING id, owner_id, title, is_done, created_at",
        )
        .bind(todo_id)
        .bind(&update.title)
        .bind(update.done)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(todo_from_row(row))
    }

    async fn delete_todo(&self, todo_id: TodoId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(todo_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
