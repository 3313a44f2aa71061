//! User account models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::{Role, UserId};

/// Domain user (never carries the password digest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub roles: BTreeSet<Role>,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create an account. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub phone_number: Option<String>,
    pub roles: BTreeSet<Role>,
    /// Also grant [`Role::Admin`] if no account exists yet. The store decides
    /// this in the same write as the insert.
    pub admin_if_first: bool,
}

/// Self-service profile changes; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.phone_number.is_none()
    }
}

/// Administrative field changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFieldUpdate {
    Roles(BTreeSet<Role>),
    Blocked(bool),
}

/// Sortable columns of the user listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserSortKey {
    #[default]
    Id,
    Username,
    Email,
}

impl UserSortKey {
    pub fn column(&self) -> &'static str {
        match self {
            UserSortKey::Id => "id",
            UserSortKey::Username => "username",
            UserSortKey::Email => "email",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter, order and page for the administrative user listing.
#[derive(Debug, Clone)]
pub struct UserQuery {
    /// Case-insensitive substring of username or email.
    pub search: Option<String>,
    pub sort_by: UserSortKey,
    pub sort_order: SortOrder,
    pub blocked: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort_by: UserSortKey::default(),
            sort_order: SortOrder::default(),
            blocked: None,
            limit: 20,
            offset: 0,
        }
    }
}

/// One page of users plus the unpaged total.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
}
