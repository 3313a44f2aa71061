//! Password hashing via bcrypt.

use super::AuthError;

/// Default bcrypt cost factor.
pub const DEFAULT_COST: u32 = 12;

/// Verified against when a login does not exist, so unknown logins cost
/// the same bcrypt work as known ones.
const DECOY_PASSWORD: &str = "decoy-password-never-matches";

/// bcrypt hashing primitive with a fixed cost.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    decoy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, AuthError> {
        let decoy_hash = hash_with_cost(DECOY_PASSWORD, cost)?;
        Ok(Self { cost, decoy_hash })
    }

    /// Hash a password with the configured cost, off the async workers.
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let (password, cost) = (password.to_owned(), self.cost);
        blocking(move || hash_with_cost(&password, cost)).await?
    }

    /// Verify a password against a bcrypt digest (constant-time compare).
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let (password, hash) = (password.to_owned(), hash.to_owned());
        blocking(move || {
            bcrypt::verify(&password, &hash)
                .map_err(|e| AuthError::Infrastructure(format!("bcrypt verify: {e}")))
        })
        .await?
    }

    /// Burn one verification's worth of time; always `false`.
    pub async fn verify_decoy(&self, password: &str) -> bool {
        let (password, hash) = (password.to_owned(), self.decoy_hash.clone());
        let _ = blocking(move || bcrypt::verify(&password, &hash)).await;
        false
    }
}

/// Run CPU-bound bcrypt work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::Infrastructure(format!("bcrypt task join failed: {e}")))
}

fn hash_with_cost(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Infrastructure(format!("bcrypt hash: {e}")))
}
