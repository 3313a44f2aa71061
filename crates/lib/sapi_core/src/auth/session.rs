//! Session checks: per-request token verification and logout.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::jwt::TokenIssuer;
use super::{AuthError, BoundedStore};
use crate::models::auth::{IdentityContext, Role, UserId, effective_roles};

/// Verifies access tokens and builds the request identity context.
///
/// `Extracted → SignatureChecked → ExpiryChecked → VersionChecked →
/// Authorized`; any failed step rejects and nothing downstream runs.
#[derive(Clone)]
pub struct TokenVerifier {
    issuer: TokenIssuer,
    store: BoundedStore,
}

impl TokenVerifier {
    pub fn new(issuer: TokenIssuer, store: BoundedStore) -> Self {
        Self { issuer, store }
    }

    pub async fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityContext, AuthError> {
        let claims = self.issuer.decode_access_token(token, now)?;
        let user_id: UserId = claims.sub.parse().map_err(|_| AuthError::MalformedToken)?;

        // One storage read per request: the logout-invalidation check.
        let Some(state) = self.store.session_state(user_id).await? else {
            debug!(user_id, "token rejected: identity no longer exists");
            return Err(AuthError::SessionInvalidated);
        };
        if state.session_version != claims.ver {
            debug!(
                user_id,
                token_version = claims.ver,
                current_version = state.session_version,
                "token rejected: session invalidated"
            );
            return Err(AuthError::SessionInvalidated);
        }

        let roles: BTreeSet<Role> = claims.roles.into_iter().collect();
        Ok(IdentityContext {
            user_id,
            roles: effective_roles(&roles, state.blocked),
            blocked: state.blocked,
        })
    }
}

/// Logout: retroactively invalidates every outstanding session.
#[derive(Clone)]
pub struct SessionInvalidator {
    store: BoundedStore,
}

impl SessionInvalidator {
    pub fn new(store: BoundedStore) -> Self {
        Self { store }
    }

    /// Bump the session version and drop the refresh token, atomically.
    ///
    /// Every access token issued before this returns fails its next
    /// verification.
    pub async fn logout(&self, user_id: UserId) -> Result<(), AuthError> {
        if !self.store.invalidate_sessions(user_id).await? {
            debug!(user_id, "logout for missing identity");
            return Err(AuthError::SessionInvalidated);
        }
        info!(user_id, "sessions invalidated");
        Ok(())
    }
}
