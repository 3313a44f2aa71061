//! Authentication domain models.
//!
//! These are internal domain models, distinct from the wire models in
//! `sapi_api` (which carry `#[serde(rename)]` for camelCase etc.).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric user id, assigned at account creation and never changed.
pub type UserId = i64;

/// A role granted to an identity by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    /// Canonical upper-case name, as stored and as carried in tokens.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Moderator => "MODERATOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "MODERATOR" => Ok(Role::Moderator),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Parse stored role names into a role set.
pub fn parse_roles<I, S>(names: I) -> Result<BTreeSet<Role>, UnknownRole>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().map(|n| n.as_ref().parse()).collect()
}

/// An authenticated principal as held by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub roles: BTreeSet<Role>,
    pub blocked: bool,
    /// Incremented only by logout; starts at 0.
    pub session_version: i64,
}

impl Identity {
    /// Roles used for authorization decisions.
    ///
    /// A blocked identity is treated as a base-role user regardless of
    /// what it has been granted.
    pub fn effective_roles(&self) -> BTreeSet<Role> {
        effective_roles(&self.roles, self.blocked)
    }
}

/// Blocked overrides every elevated role.
pub fn effective_roles(roles: &BTreeSet<Role>, blocked: bool) -> BTreeSet<Role> {
    if blocked {
        BTreeSet::from([Role::User])
    } else {
        roles.clone()
    }
}

/// Stored credential for a login.
#[derive(Debug, Clone)]
pub struct Credential {
    pub identity: Identity,
    pub password_hash: String,
}

/// The per-request slice of identity state the verifier re-reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub session_version: i64,
    pub blocked: bool,
}

/// Refresh token record stored in the database (one per identity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub user_id: UserId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user id (standard JWT `sub` claim).
    pub sub: String,
    /// Roles snapshot at issuance.
    pub roles: Vec<Role>,
    /// Session version snapshot at issuance.
    pub ver: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Request-scoped identity built by the token verifier.
///
/// Consumed read-only by the access control policy and by handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    pub user_id: UserId,
    pub roles: BTreeSet<Role>,
    pub blocked: bool,
}

impl IdentityContext {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// A signed access token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// An opaque refresh token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful sign-in or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}
