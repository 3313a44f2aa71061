//! Authentication and session authorization.
//!
//! Credential verification, access/refresh token issuance, token
//! verification, capability checks and logout. All session state lives in
//! the [`AuthStore`]; the only process-wide value is the signing key, which
//! is injected through [`AuthService::new`].

pub mod credentials;
pub mod jwt;
pub mod password;
pub mod policy;
pub mod refresh;
pub mod service;
pub mod session;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;

use crate::models::auth::{Credential, Identity, RefreshTokenRecord, SessionState, UserId};
use crate::store::{AuthStore, StoreError};

pub use policy::{Capability, Decision, authorize};
pub use service::AuthService;

/// Authentication errors.
///
/// The four token variants are distinguishable here for logging; at the
/// HTTP boundary they collapse into one generic 401.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Session invalidated")]
    SessionInvalidated,

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Refresh token expired")]
    RefreshExpired,

    #[error("Refresh token superseded")]
    RefreshSuperseded,

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl AuthError {
    /// True for every reason an access token is refused.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken
                | AuthError::InvalidSignature
                | AuthError::TokenExpired
                | AuthError::SessionInvalidated
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Infrastructure(e.to_string())
    }
}

/// Lifetimes, cost factors and timeouts of the auth core.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    /// Upper bound on every individual store call.
    pub store_timeout: Duration,
    pub bcrypt_cost: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_ttl: chrono::Duration::hours(2),
            refresh_ttl: chrono::Duration::hours(8),
            store_timeout: Duration::from_secs(5),
            bcrypt_cost: password::DEFAULT_COST,
        }
    }
}

/// [`AuthStore`] wrapper that bounds each call with a timeout.
///
/// A timeout surfaces as [`AuthError::Infrastructure`], never as an
/// authentication failure. Nothing is retried.
#[derive(Clone)]
pub struct BoundedStore {
    inner: Arc<dyn AuthStore>,
    timeout: Duration,
}

impl BoundedStore {
    pub fn new(inner: Arc<dyn AuthStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(op, error = %e, "auth store call failed");
                Err(e.into())
            }
            Err(_) => {
                error!(op, timeout_ms = self.timeout.as_millis() as u64, "auth store call timed out");
                Err(AuthError::Infrastructure(format!("{op} timed out")))
            }
        }
    }

    pub async fn load_credential(&self, login: &str) -> Result<Option<Credential>, AuthError> {
        self.call("load_credential", self.inner.load_credential(login))
            .await
    }

    pub async fn load_identity(&self, user_id: UserId) -> Result<Option<Identity>, AuthError> {
        self.call("load_identity", self.inner.load_identity(user_id))
            .await
    }

    pub async fn session_state(&self, user_id: UserId) -> Result<Option<SessionState>, AuthError> {
        self.call("session_state", self.inner.session_state(user_id))
            .await
    }

    pub async fn store_refresh_token(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.call(
            "store_refresh_token",
            self.inner.store_refresh_token(user_id, token_hash, expires_at),
        )
        .await
    }

    pub async fn rotate_refresh_token(
        &self,
        user_id: UserId,
        current_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        self.call(
            "rotate_refresh_token",
            self.inner
                .rotate_refresh_token(user_id, current_hash, new_hash, expires_at),
        )
        .await
    }

    pub async fn lookup_refresh_token(
        &self,
        user_id: UserId,
    ) -> Result<Option<RefreshTokenRecord>, AuthError> {
        self.call("lookup_refresh_token", self.inner.lookup_refresh_token(user_id))
            .await
    }

    pub async fn invalidate_sessions(&self, user_id: UserId) -> Result<bool, AuthError> {
        self.call("invalidate_sessions", self.inner.invalidate_sessions(user_id))
            .await
    }
}
