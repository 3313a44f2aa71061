//! JWT access tokens: issuance, signature and expiry checks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use super::AuthError;
use crate::models::auth::{AccessToken, Identity, TokenClaims};

/// HS256 signing material, built once at startup and shared read-only.
#[derive(Clone)]
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKeys(..)")
    }
}

/// Mints signed, time-bounded access tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<SigningKeys>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(keys: Arc<SigningKeys>, ttl: Duration) -> Self {
        Self { keys, ttl }
    }

    /// Sign an access token for `identity` issued at `now`.
    ///
    /// Timestamps are whole seconds: `now` is truncated, so the returned
    /// `expires_at` is exactly the `exp` claim.
    pub fn issue_access_token(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, AuthError> {
        let iat = now.timestamp();
        let exp = iat + self.ttl.num_seconds();
        let claims = TokenClaims {
            sub: identity.id.to_string(),
            roles: identity.roles.iter().copied().collect(),
            ver: identity.session_version,
            iat,
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| AuthError::Infrastructure(format!("jwt encode: {e}")))?;
        let expires_at = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| AuthError::Infrastructure(format!("expiry out of range: {exp}")))?;
        Ok(AccessToken { token, expires_at })
    }

    /// Check signature, then expiry against `now`.
    ///
    /// Valid only while `now < exp`. Session-version checking is the
    /// caller's job.
    pub fn decode_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below with millisecond precision and no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<TokenClaims>(token, &self.keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            })?;

        if now.timestamp_millis() >= claims.exp.saturating_mul(1000) {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    load_or_create_secret(&jwt_secret_path())
}

/// Read the secret persisted at `path`, or generate one and try to persist it.
///
/// A secret that cannot be written is still returned, but it will not
/// survive a restart and every outstanding token dies with the process.
fn load_or_create_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    match persist_secret(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "could not persist generated JWT secret; sessions will not survive a restart"
        ),
    }
    secret
}

fn persist_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secret)
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sapi")
        .join("jwt-secret")
}
