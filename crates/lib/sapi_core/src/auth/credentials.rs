//! Credential verification: login + password → identity.

use tracing::debug;

use super::password::PasswordHasher;
use super::{AuthError, BoundedStore};
use crate::models::auth::Identity;

/// Checks a login/password pair against the stored digest.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: BoundedStore,
    hasher: PasswordHasher,
}

impl CredentialVerifier {
    pub fn new(store: BoundedStore, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Returns the identity with its effective roles.
    ///
    /// An unknown login and a wrong password yield the same
    /// [`AuthError::InvalidCredentials`]. A blocked identity authenticates
    /// but carries only the base role.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<Identity, AuthError> {
        let Some(credential) = self.store.load_credential(login).await? else {
            self.hasher.verify_decoy(password).await;
            debug!(login, "sign-in rejected: unknown login");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &credential.password_hash).await? {
            debug!(user_id = credential.identity.id, "sign-in rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let mut identity = credential.identity;
        identity.roles = identity.effective_roles();
        Ok(identity)
    }
}
