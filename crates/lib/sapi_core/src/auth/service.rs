//! Authentication service: sign-in, refresh, verification and logout.
//!
//! Composes the credential verifier, token issuer, refresh-token store
//! adapter, token verifier and session invalidator over one bounded store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::credentials::CredentialVerifier;
use super::jwt::{SigningKeys, TokenIssuer};
use super::password::PasswordHasher;
use super::refresh::RefreshTokens;
use super::session::{SessionInvalidator, TokenVerifier};
use super::{AuthError, AuthSettings, BoundedStore};
use crate::models::auth::{IdentityContext, TokenPair, UserId};
use crate::store::AuthStore;

/// Entry point of the authentication core.
#[derive(Clone)]
pub struct AuthService {
    credentials: CredentialVerifier,
    issuer: TokenIssuer,
    refresh: RefreshTokens,
    verifier: TokenVerifier,
    invalidator: SessionInvalidator,
    store: BoundedStore,
}

impl AuthService {
    /// Build the service around an explicitly provided signing secret.
    pub fn new(
        store: Arc<dyn AuthStore>,
        secret: &[u8],
        settings: &AuthSettings,
    ) -> Result<Self, AuthError> {
        let store = BoundedStore::new(store, settings.store_timeout);
        let keys = Arc::new(SigningKeys::from_secret(secret));
        let issuer = TokenIssuer::new(keys, settings.access_ttl);
        let hasher = PasswordHasher::new(settings.bcrypt_cost)?;
        Ok(Self {
            credentials: CredentialVerifier::new(store.clone(), hasher),
            refresh: RefreshTokens::new(store.clone(), settings.refresh_ttl),
            verifier: TokenVerifier::new(issuer.clone(), store.clone()),
            invalidator: SessionInvalidator::new(store.clone()),
            issuer,
            store,
        })
    }

    /// The password primitive, for account creation and password changes.
    pub fn hasher(&self) -> &PasswordHasher {
        self.credentials.hasher()
    }

    pub async fn sign_in(&self, login: &str, password: &str) -> Result<TokenPair, AuthError> {
        self.sign_in_at(login, password, Utc::now()).await
    }

    pub async fn sign_in_at(
        &self,
        login: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let identity = self.credentials.authenticate(login, password).await?;
        let access = self.issuer.issue_access_token(&identity, now)?;
        let refresh = self.refresh.issue(identity.id, now).await?;
        info!(user_id = identity.id, "signed in");
        Ok(TokenPair { access, refresh })
    }

    /// Exchange a refresh token for a new access token and a rotated refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.refresh_at(refresh_token, Utc::now()).await
    }

    pub async fn refresh_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let valid = self.refresh.validate(refresh_token, now).await?;

        // Current roles and version: a refresh picks up role changes.
        let mut identity = self
            .store
            .load_identity(valid.user_id)
            .await?
            .ok_or(AuthError::RefreshExpired)?;
        identity.roles = identity.effective_roles();

        let refresh = self.refresh.rotate(&valid, now).await?;
        let access = self.issuer.issue_access_token(&identity, now)?;
        info!(user_id = identity.id, "tokens refreshed");
        Ok(TokenPair { access, refresh })
    }

    /// Validate an access token presented on a protected request.
    pub async fn verify(&self, access_token: &str) -> Result<IdentityContext, AuthError> {
        self.verify_at(access_token, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<IdentityContext, AuthError> {
        self.verifier.verify(access_token, now).await
    }

    pub async fn logout(&self, user_id: UserId) -> Result<(), AuthError> {
        self.invalidator.logout(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::auth::{Capability, Decision, authorize};
    use crate::models::auth::Role;
    use crate::models::user::{NewUser, UserFieldUpdate};
    use crate::store::{MemoryStore, UserStore};

    const SECRET: &[u8] = b"service-test-secret";

    fn settings() -> AuthSettings {
        AuthSettings {
            access_ttl: chrono::Duration::minutes(15),
            refresh_ttl: chrono::Duration::hours(8),
            store_timeout: Duration::from_secs(1),
            bcrypt_cost: 4,
        }
    }

    async fn setup(roles: &[Role]) -> (Arc<MemoryStore>, AuthService, UserId) {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(store.clone(), SECRET, &settings()).unwrap();
        let user = store
            .create_user(NewUser {
                login: "alice".into(),
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: service.hasher().hash("correct").await.unwrap(),
                phone_number: None,
                roles: roles.iter().copied().collect(),
                admin_if_first: false,
            })
            .await
            .unwrap();
        (store, service, user.id)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn fresh_token_verifies_with_exact_roles() {
        let roles = [Role::User, Role::Moderator];
        let (_, service, user_id) = setup(&roles).await;

        let pair = service.sign_in_at("alice", "correct", t0()).await.unwrap();
        let ctx = service.verify_at(&pair.access.token, t0()).await.unwrap();

        assert_eq!(user_id, ctx.user_id);
        assert_eq!(roles.into_iter().collect::<BTreeSet<_>>(), ctx.roles);
        assert!(!ctx.blocked);
    }

    #[tokio::test]
    async fn access_token_expiry_edge() {
        let (_, service, _) = setup(&[Role::User]).await;
        let pair = service.sign_in_at("alice", "correct", t0()).await.unwrap();
        let ms = chrono::Duration::milliseconds(1);

        assert!(service.verify_at(&pair.access.token, pair.access.expires_at - ms).await.is_ok());
        assert!(matches!(
            service.verify_at(&pair.access.token, pair.access.expires_at + ms).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn logout_invalidates_unexpired_access_token() {
        let (_, service, user_id) = setup(&[Role::User]).await;
        let pair = service.sign_in_at("alice", "correct", t0()).await.unwrap();
        assert!(service.verify_at(&pair.access.token, t0()).await.is_ok());

        service.logout(user_id).await.unwrap();

        assert!(matches!(
            service.verify_at(&pair.access.token, t0()).await,
            Err(AuthError::SessionInvalidated)
        ));
        assert!(matches!(
            service.refresh_at(&pair.refresh.token, t0()).await,
            Err(AuthError::RefreshExpired)
        ));

        // A new sign-in after logout carries the new version.
        let again = service.sign_in_at("alice", "correct", t0()).await.unwrap();
        assert!(service.verify_at(&again.access.token, t0()).await.is_ok());
    }

    #[tokio::test]
    async fn newer_refresh_token_supersedes_older() {
        let (_, service, _) = setup(&[Role::User]).await;
        let first = service.sign_in_at("alice", "correct", t0()).await.unwrap();
        let second = service.sign_in_at("alice", "correct", t0()).await.unwrap();

        assert!(matches!(
            service.refresh_at(&first.refresh.token, t0()).await,
            Err(AuthError::RefreshSuperseded)
        ));
        assert!(service.refresh_at(&second.refresh.token, t0()).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_token_is_superseded() {
        let (_, service, _) = setup(&[Role::User]).await;
        let pair = service.sign_in_at("alice", "correct", t0()).await.unwrap();

        let refreshed = service.refresh_at(&pair.refresh.token, t0()).await.unwrap();
        assert_ne!(pair.refresh.token, refreshed.refresh.token);
        assert!(service.verify_at(&refreshed.access.token, t0()).await.is_ok());
        assert!(matches!(
            service.refresh_at(&pair.refresh.token, t0()).await,
            Err(AuthError::RefreshSuperseded)
        ));
    }

    #[tokio::test]
    async fn expired_refresh_token_requires_full_sign_in() {
        let (_, service, _) = setup(&[Role::User]).await;
        let pair = service.sign_in_at("alice", "correct", t0()).await.unwrap();
        assert!(matches!(
            service.refresh_at(&pair.refresh.token, pair.refresh.expires_at).await,
            Err(AuthError::RefreshExpired)
        ));
    }

    #[tokio::test]
    async fn tokens_are_role_snapshots_until_refresh() {
        let (store, service, user_id) = setup(&[Role::User]).await;
        let pair = service.sign_in_at("alice", "correct", t0()).await.unwrap();

        let ctx = service.verify_at(&pair.access.token, t0()).await.unwrap();
        assert_eq!(Decision::Denied, authorize(&ctx, Capability::Moderator));

        store
            .apply_field_update(
                user_id,
                &UserFieldUpdate::Roles(BTreeSet::from([Role::User, Role::Moderator])),
            )
            .await
            .unwrap();

        // Old token still carries {USER}.
        let ctx = service.verify_at(&pair.access.token, t0()).await.unwrap();
        assert_eq!(BTreeSet::from([Role::User]), ctx.roles);

        let refreshed = service.refresh_at(&pair.refresh.token, t0()).await.unwrap();
        let ctx = service.verify_at(&refreshed.access.token, t0()).await.unwrap();
        assert_eq!(Decision::Allowed, authorize(&ctx, Capability::Moderator));
    }

    #[tokio::test]
    async fn blocking_strips_roles_from_outstanding_tokens() {
        let (store, service, user_id) = setup(&[Role::User, Role::Admin]).await;
        let pair = service.sign_in_at("alice", "correct", t0()).await.unwrap();

        store
            .apply_field_update(user_id, &UserFieldUpdate::Blocked(true))
            .await
            .unwrap();

        let ctx = service.verify_at(&pair.access.token, t0()).await.unwrap();
        assert!(ctx.blocked);
        assert_eq!(Decision::Denied, authorize(&ctx, Capability::Admin));
        assert_eq!(Decision::Allowed, authorize(&ctx, Capability::SelfOnly(user_id)));
    }

    #[tokio::test]
    async fn deleted_identity_token_is_rejected() {
        let (store, service, user_id) = setup(&[Role::User]).await;
        let pair = service.sign_in_at("alice", "correct", t0()).await.unwrap();

        store.delete_user(user_id).await.unwrap();

        assert!(matches!(
            service.verify_at(&pair.access.token, t0()).await,
            Err(AuthError::SessionInvalidated)
        ));
    }

    #[tokio::test]
    async fn rotated_signing_key_invalidates_tokens() {
        let (store, service, _) = setup(&[Role::User]).await;
        let pair = service.sign_in_at("alice", "correct", t0()).await.unwrap();

        let rotated = AuthService::new(store, b"another-secret", &settings()).unwrap();
        assert!(matches!(
            rotated.verify_at(&pair.access.token, t0()).await,
            Err(AuthError::InvalidSignature)
        ));
    }
}
