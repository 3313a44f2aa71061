//! Refresh tokens: generation, at-rest hashing, lookup and rotation.
//!
//! A refresh token reads `<user id>.<secret>`. The id selects the
//! identity's single refresh-token row; the SHA-256 of the whole token
//! decides whether the presented token is the one currently registered.

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{AuthError, BoundedStore};
use crate::models::auth::{RefreshToken, UserId};

/// Length of the random part; 64 alphanumerics carry ~380 bits of entropy.
const SECRET_LEN: usize = 64;

/// Generate a cryptographically random refresh token for `user_id`.
fn generate_refresh_token(user_id: UserId) -> String {
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    format!("{user_id}.{secret}")
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract the user id selector, if the token is well-formed.
fn parse_selector(token: &str) -> Option<UserId> {
    let (id, secret) = token.split_once('.')?;
    if secret.len() != SECRET_LEN || !secret.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    id.parse().ok().filter(|id: &UserId| *id > 0)
}

/// A presented refresh token that matched the registered one.
#[derive(Debug, Clone)]
pub struct ValidRefresh {
    pub user_id: UserId,
    pub token_hash: String,
}

/// Issues and validates refresh tokens against the store.
#[derive(Clone)]
pub struct RefreshTokens {
    store: BoundedStore,
    ttl: Duration,
}

impl RefreshTokens {
    pub fn new(store: BoundedStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Mint a token and upsert it as the identity's only refresh token.
    pub async fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<RefreshToken, AuthError> {
        let token = generate_refresh_token(user_id);
        let expires_at = now + self.ttl;
        self.store
            .store_refresh_token(user_id, &hash_refresh_token(&token), expires_at)
            .await?;
        Ok(RefreshToken { token, expires_at })
    }

    /// Check a presented token.
    ///
    /// Absent, unparseable or past-expiry → [`AuthError::RefreshExpired`];
    /// present but not the registered one → [`AuthError::RefreshSuperseded`].
    pub async fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<ValidRefresh, AuthError> {
        let Some(user_id) = parse_selector(token) else {
            debug!("refresh rejected: unparseable token");
            return Err(AuthError::RefreshExpired);
        };
        let Some(record) = self.store.lookup_refresh_token(user_id).await? else {
            debug!(user_id, "refresh rejected: no registered token");
            return Err(AuthError::RefreshExpired);
        };
        if record.expires_at <= now {
            debug!(user_id, "refresh rejected: expired");
            return Err(AuthError::RefreshExpired);
        }
        let token_hash = hash_refresh_token(token);
        if token_hash != record.token_hash {
            debug!(user_id, "refresh rejected: superseded");
            return Err(AuthError::RefreshSuperseded);
        }
        Ok(ValidRefresh { user_id, token_hash })
    }

    /// Replace a validated token with a fresh one.
    ///
    /// Fails with [`AuthError::RefreshSuperseded`] if a concurrent refresh
    /// or sign-in replaced it after validation.
    pub async fn rotate(&self, valid: &ValidRefresh, now: DateTime<Utc>) -> Result<RefreshToken, AuthError> {
        let token = generate_refresh_token(valid.user_id);
        let expires_at = now + self.ttl;
        let rotated = self
            .store
            .rotate_refresh_token(
                valid.user_id,
                &valid.token_hash,
                &hash_refresh_token(&token),
                expires_at,
            )
            .await?;
        if !rotated {
            debug!(user_id = valid.user_id, "refresh lost rotation race");
            return Err(AuthError::RefreshSuperseded);
        }
        Ok(RefreshToken { token, expires_at })
    }
}
