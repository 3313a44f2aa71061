//! In-memory backend.
//!
//! Holds every table behind one `RwLock`, so each trait call is atomic with
//! respect to every other. Used by tests and by `sapi_server --memory`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{AuthStore, StoreError, StoreResult, TodoStore, UserStore};
use crate::models::auth::{Credential, Identity, RefreshTokenRecord, Role, SessionState, UserId};
use crate::models::todo::{NewTodo, Todo, TodoFilter, TodoId, TodoList, TodoSummary, TodoUpdate};
use crate::models::user::{
    NewUser, ProfileUpdate, SortOrder, User, UserFieldUpdate, UserPage, UserQuery, UserSortKey,
};

#[derive(Debug, Clone)]
struct UserRow {
    user: User,
    password_hash: String,
    session_version: i64,
}

impl UserRow {
    fn identity(&self) -> Identity {
        Identity {
            id: self.user.id,
            roles: self.user.roles.clone(),
            blocked: self.user.blocked,
            session_version: self.session_version,
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, UserRow>,
    refresh_tokens: HashMap<UserId, RefreshTokenRecord>,
    todos: BTreeMap<TodoId, Todo>,
    next_user_id: UserId,
    next_todo_id: TodoId,
}

impl Tables {
    fn user_mut(&mut self, user_id: UserId) -> StoreResult<&mut UserRow> {
        self.users.get_mut(&user_id).ok_or(StoreError::NotFound)
    }

    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|r| r.user.email == email && Some(r.user.id) != except)
    }
}

/// Process-local store; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn load_credential(&self, login: &str) -> StoreResult<Option<Credential>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|r| r.user.login == login)
            .map(|r| Credential {
                identity: r.identity(),
                password_hash: r.password_hash.clone(),
            }))
    }

    async fn load_identity(&self, user_id: UserId) -> StoreResult<Option<Identity>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&user_id).map(UserRow::identity))
    }

    async fn session_state(&self, user_id: UserId) -> StoreResult<Option<SessionState>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&user_id).map(|r| SessionState {
            session_version: r.session_version,
            blocked: r.user.blocked,
        }))
    }

    async fn store_refresh_token(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        tables.refresh_tokens.insert(
            user_id,
            RefreshTokenRecord {
                user_id,
                token_hash: token_hash.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        user_id: UserId,
        current_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.refresh_tokens.get_mut(&user_id) {
            Some(record) if record.token_hash == current_hash => {
                record.token_hash = new_hash.to_string();
                record.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn lookup_refresh_token(
        &self,
        user_id: UserId,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.refresh_tokens.get(&user_id).cloned())
    }

    async fn invalidate_sessions(&self, user_id: UserId) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables.users.get_mut(&user_id) else {
            return Ok(false);
        };
        row.session_version += 1;
        tables.refresh_tokens.remove(&user_id);
        Ok(true)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|r| r.user.login == new.login) {
            return Err(StoreError::Conflict("login already used".into()));
        }
        if tables.email_taken(&new.email, None) {
            return Err(StoreError::Conflict("email already used".into()));
        }
        let mut roles = new.roles;
        if new.admin_if_first && tables.users.is_empty() {
            roles.insert(Role::Admin);
        }
        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            login: new.login,
            username: new.username,
            email: new.email,
            phone_number: new.phone_number,
            roles,
            blocked: false,
            created_at: Utc::now(),
        };
        tables.users.insert(
            user.id,
            UserRow {
                user: user.clone(),
                password_hash: new.password_hash,
                session_version: 0,
            },
        );
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&user_id).map(|r| r.user.clone()))
    }

    async fn list_users(&self, query: &UserQuery) -> StoreResult<UserPage> {
        let tables = self.tables.read().await;
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut users: Vec<User> = tables
            .users
            .values()
            .map(|r| &r.user)
            .filter(|u| query.blocked.is_none_or(|b| u.blocked == b))
            .filter(|u| {
                needle.as_deref().is_none_or(|n| {
                    u.username.to_lowercase().contains(n) || u.email.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();

        users.sort_by(|a, b| {
            let ord = match query.sort_by {
                UserSortKey::Id => a.id.cmp(&b.id),
                UserSortKey::Username => a.username.cmp(&b.username),
                UserSortKey::Email => a.email.cmp(&b.email),
            };
            match query.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = users.len() as i64;
        let users = users
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok(UserPage { users, total })
    }

    async fn update_profile(&self, user_id: UserId, update: &ProfileUpdate) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &update.email
            && tables.email_taken(email, Some(user_id))
        {
            return Err(StoreError::Conflict("email already used".into()));
        }
        let row = tables.user_mut(user_id)?;
        if let Some(username) = &update.username {
            row.user.username = username.clone();
        }
        if let Some(email) = &update.email {
            row.user.email = email.clone();
        }
        if let Some(phone) = &update.phone_number {
            row.user.phone_number = Some(phone.clone());
        }
        Ok(row.user.clone())
    }

    async fn set_password_hash(&self, user_id: UserId, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.user_mut(user_id)?.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn apply_field_update(
        &self,
        user_id: UserId,
        update: &UserFieldUpdate,
    ) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let row = tables.user_mut(user_id)?;
        match update {
            UserFieldUpdate::Roles(roles) => row.user.roles = roles.clone(),
            UserFieldUpdate::Blocked(blocked) => row.user.blocked = *blocked,
        }
        Ok(row.user.clone())
    }

    async fn delete_user(&self, user_id: UserId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&user_id).is_none() {
            return Err(StoreError::NotFound);
        }
        tables.refresh_tokens.remove(&user_id);
        tables.todos.retain(|_, t| t.owner_id != user_id);
        Ok(())
    }
}

#[async_trait]
impl TodoStore for MemoryStore {
    async fn create_todo(&self, owner_id: UserId, todo: &NewTodo) -> StoreResult<Todo> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&owner_id) {
            return Err(StoreError::NotFound);
        }
        tables.next_todo_id += 1;
        let todo = Todo {
            id: tables.next_todo_id,
            owner_id,
            title: todo.title.clone(),
            done: todo.done,
            created_at: Utc::now(),
        };
        tables.todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn get_todo(&self, todo_id: TodoId) -> StoreResult<Option<Todo>> {
        Ok(self.tables.read().await.todos.get(&todo_id).cloned())
    }

    async fn list_todos(&self, owner_id: UserId, filter: TodoFilter) -> StoreResult<TodoList> {
        let tables = self.tables.read().await;
        let mut summary = TodoSummary::default();
        let mut todos = Vec::new();
        for todo in tables.todos.values().filter(|t| t.owner_id == owner_id) {
            summary.all += 1;
            if todo.done {
                summary.completed += 1;
            } else {
                summary.in_work += 1;
            }
            if filter.matches(todo) {
                todos.push(todo.clone());
            }
        }
        Ok(TodoList { todos, summary })
    }

    async fn update_todo(&self, todo_id: TodoId, update: &TodoUpdate) -> StoreResult<Todo> {
        let mut tables = self.tables.write().await;
        let todo = tables.todos.get_mut(&todo_id).ok_or(StoreError::NotFound)?;
        if let Some(title) = &update.title {
            todo.title = title.clone();
        }
        if let Some(done) = update.done {
            todo.done = done;
        }
        Ok(todo.clone())
    }

    async fn delete_todo(&self, todo_id: TodoId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .todos
            .remove(&todo_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;

    use super::*;

    fn new_user(login: &str) -> NewUser {
        NewUser {
            login: login.to_string(),
            username: login.to_string(),
            email: format!("{login}@example.com"),
            password_hash: "digest".to_string(),
            phone_number: None,
            roles: BTreeSet::from([Role::User]),
            admin_if_first: false,
        }
    }

    #[tokio::test]
    async fn duplicate_login_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice")).await.unwrap();
        let err = store.create_user(new_user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn only_the_first_account_becomes_admin() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut user = new_user(&format!("user{i}"));
                    user.admin_if_first = true;
                    store.create_user(user).await.unwrap()
                })
            })
            .collect();

        let mut admins = Vec::new();
        for handle in handles {
            let user = handle.await.unwrap();
            if user.roles.contains(&Role::Admin) {
                admins.push(user.id);
            }
        }
        assert_eq!(1, admins.len());
    }

    #[tokio::test]
    async fn admin_if_first_is_ignored_once_accounts_exist() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice")).await.unwrap();

        let mut bob = new_user("bob");
        bob.admin_if_first = true;
        let bob = store.create_user(bob).await.unwrap();
        assert_eq!(BTreeSet::from([Role::User]), bob.roles);
    }

    #[tokio::test]
    async fn refresh_token_upsert_keeps_one_row() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice")).await.unwrap();
        let exp = Utc::now() + Duration::hours(1);

        store.store_refresh_token(user.id, "h1", exp).await.unwrap();
        store.store_refresh_token(user.id, "h2", exp).await.unwrap();

        let record = store.lookup_refresh_token(user.id).await.unwrap().unwrap();
        assert_eq!("h2", record.token_hash);
    }

    #[tokio::test]
    async fn rotation_requires_current_hash() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice")).await.unwrap();
        let exp = Utc::now() + Duration::hours(1);
        store.store_refresh_token(user.id, "h1", exp).await.unwrap();

        assert!(!store.rotate_refresh_token(user.id, "stale", "h2", exp).await.unwrap());
        assert!(store.rotate_refresh_token(user.id, "h1", "h2", exp).await.unwrap());
        assert!(!store.rotate_refresh_token(user.id, "h1", "h3", exp).await.unwrap());
    }

    #[tokio::test]
    async fn invalidate_bumps_version_and_drops_refresh_token() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice")).await.unwrap();
        store
            .store_refresh_token(user.id, "h1", Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        assert!(store.invalidate_sessions(user.id).await.unwrap());
        assert!(store.invalidate_sessions(user.id).await.unwrap());

        let state = store.session_state(user.id).await.unwrap().unwrap();
        assert_eq!(2, state.session_version);
        assert!(store.lookup_refresh_token(user.id).await.unwrap().is_none());
        assert!(!store.invalidate_sessions(999).await.unwrap());
    }

    #[tokio::test]
    async fn list_users_filters_sorts_and_pages() {
        let store = MemoryStore::new();
        for login in ["carol", "alice", "bob"] {
            store.create_user(new_user(login)).await.unwrap();
        }
        let bob = store.load_credential("bob").await.unwrap().unwrap();
        store
            .apply_field_update(bob.identity.id, &UserFieldUpdate::Blocked(true))
            .await
            .unwrap();

        let page = store
            .list_users(&UserQuery {
                sort_by: UserSortKey::Username,
                sort_order: SortOrder::Desc,
                blocked: Some(false),
                limit: 1,
                ..UserQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(2, page.total);
        assert_eq!(1, page.users.len());
        assert_eq!("carol", page.users[0].username);
    }

    #[tokio::test]
    async fn todo_summary_counts_everything_the_owner_has() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice")).await.unwrap();
        for (title, done) in [("a", true), ("b", false), ("c", false)] {
            let todo = NewTodo {
                title: title.to_string(),
                done,
            };
            store.create_todo(user.id, &todo).await.unwrap();
        }

        let list = store.list_todos(user.id, TodoFilter::Completed).await.unwrap();
        assert_eq!(1, list.todos.len());
        assert_eq!(
            TodoSummary {
                all: 3,
                completed: 1,
                in_work: 2
            },
            list.summary
        );
    }
}
