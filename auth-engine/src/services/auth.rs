use std::sync::Arc;

use crate::models::{Identity, MagicLink, MagicLinkKind};
use crate::utils::{hash_password, matches_any, verify_password, Password, PasswordHashString};

use super::api_key::ApiKeyService;
use super::error::{AuthFailure, ServiceError};
use super::federated::{FederatedProvider, IdentityExchange};
use super::identity::{IdentityService, NewIdentity};
use super::jwt::{strip_bearer, TokenClaims, TokenPair, TokenService};
use super::magic_link::MagicLinkManager;
use super::notification::{LinkNotification, NotificationKind, NotificationSender};
use super::policy::PasswordPolicy;
use super::rbac::{Principal, RbacService};
use super::store::IdentityStore;

/// Credential flows: every entry point that turns a proof of identity into
/// a token pair, plus password maintenance.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenService,
    rbac: RbacService,
    api_keys: ApiKeyService,
    magic_links: MagicLinkManager,
    identities: IdentityService,
    policy: PasswordPolicy,
    notifier: Arc<dyn NotificationSender>,
    exchange: Arc<dyn IdentityExchange>,
    allow_new_users: bool,
}

/// Collaborators and settings for [`AuthService`].
pub struct AuthServiceParts {
    pub store: Arc<dyn IdentityStore>,
    pub tokens: TokenService,
    pub magic_links: MagicLinkManager,
    pub policy: PasswordPolicy,
    pub notifier: Arc<dyn NotificationSender>,
    pub exchange: Arc<dyn IdentityExchange>,
    pub allow_new_users: bool,
}

impl AuthService {
    pub fn new(parts: AuthServiceParts) -> Self {
        let store = parts.store;
        Self {
            rbac: RbacService::new(store.clone()),
            api_keys: ApiKeyService::new(store.clone()),
            identities: IdentityService::new(store.clone(), parts.policy.clone()),
            store,
            tokens: parts.tokens,
            magic_links: parts.magic_links,
            policy: parts.policy,
            notifier: parts.notifier,
            exchange: parts.exchange,
            allow_new_users: parts.allow_new_users,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Register a password-backed identity and send the welcome link.
    pub async fn register(&self, new: NewIdentity) -> Result<Identity, ServiceError> {
        let identity = self.identities.register(new).await?;

        let access = self.rbac.resolve_scopes_and_roles(&identity).await?;
        let token = self.tokens.issue_access_token_for(
            &identity.email,
            self.magic_links.link_ttl(),
            None,
            &access.scopes,
            &access.roles,
        )?;
        self.notify(&identity.email, NotificationKind::Welcome, token.token)
            .await;

        Ok(identity)
    }

    pub async fn login_with_password(
        &self,
        email: &str,
        password: &Password,
    ) -> Result<TokenPair, ServiceError> {
        let mut identity = self
            .store
            .find_identity_by_email(email)
            .await?
            .ok_or_else(|| reject(AuthFailure::UnknownIdentity))?;

        if !identity.is_active {
            return Err(reject(AuthFailure::InactiveIdentity));
        }

        let stored = identity
            .password_hash
            .as_deref()
            .map(PasswordHashString::new)
            .ok_or_else(|| reject(AuthFailure::NoPassword))?;

        if !verify_password(password, &stored) {
            tracing::warn!(user_id = %identity.id, "Password mismatch");
            return Err(reject(AuthFailure::BadPassword));
        }

        identity.record_login("basic", "password");
        self.store.save_identity(&identity).await?;

        tracing::info!(user_id = %identity.id, "Password login succeeded");
        self.issue_session_pair(&identity).await
    }

    /// Key-authenticated pair: carries the client id, no role scopes.
    pub async fn login_with_api_key(
        &self,
        client_id: &str,
        client_secret: &Password,
    ) -> Result<TokenPair, ServiceError> {
        let principal = self.api_keys.authenticate(client_id, client_secret).await?;
        Ok(self
            .tokens
            .issue_pair(&principal.identity.email, &[], &[], Some(client_id))?)
    }

    /// Exchange a refresh-domain token for a fresh pair. Scopes and roles are
    /// re-resolved, so role changes take effect here.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let claims = self.tokens.validate_refresh_token(refresh_token)?;
        let principal = self.principal_from_claims(&claims).await?;

        match principal.client_id() {
            Some(client_id) => Ok(self
                .tokens
                .issue_pair(&principal.identity.email, &[], &[], Some(client_id))?),
            None => self.issue_session_pair(&principal.identity).await,
        }
    }

    /// Resolve the caller behind an access-domain token.
    pub async fn current_principal(&self, access_token: &str) -> Result<Principal, ServiceError> {
        let claims = self.tokens.validate_access_token(access_token)?;
        self.principal_from_claims(&claims).await
    }

    pub async fn authorize(&self, principal: &Principal, scope: &str) -> Result<(), ServiceError> {
        self.rbac.authorize(principal, scope).await
    }

    pub async fn require_admin(&self, principal: &Principal) -> Result<(), ServiceError> {
        self.rbac.require_admin(principal).await
    }

    pub async fn request_magic_link(&self, email: &str) -> Result<MagicLink, ServiceError> {
        self.request_link(email, MagicLinkKind::Magic).await
    }

    pub async fn request_password_recovery(&self, email: &str) -> Result<MagicLink, ServiceError> {
        self.request_link(email, MagicLinkKind::Recovery).await
    }

    pub async fn redeem_magic_link(&self, token: &str) -> Result<TokenPair, ServiceError> {
        let claims = self.tokens.validate_access_token(token)?;
        let mut identity = self.active_identity(&claims.sub).await?;

        self.magic_links
            .redeem(&identity, MagicLinkKind::Magic, strip_bearer(token))
            .await?;

        identity.email_verified = true;
        identity.record_login("magic_link", "email");
        self.store.save_identity(&identity).await?;

        tracing::info!(user_id = %identity.id, "Magic link login succeeded");
        self.issue_session_pair(&identity).await
    }

    /// Set a new password using a recovery link token.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &Password,
    ) -> Result<(), ServiceError> {
        let claims = self.tokens.validate_access_token(token)?;
        let mut identity = self.active_identity(&claims.sub).await?;

        if !identity.has_password() {
            return Err(ServiceError::NotPasswordBacked);
        }

        self.check_new_password(&identity, new_password)?;

        self.magic_links
            .redeem(&identity, MagicLinkKind::Recovery, strip_bearer(token))
            .await?;

        identity.rotate_password(hash_password(new_password)?.into_string());
        identity.email_verified = true;
        self.store.save_identity(&identity).await?;

        tracing::info!(user_id = %identity.id, "Password reset");
        Ok(())
    }

    pub async fn change_password(
        &self,
        principal: &Principal,
        current: &Password,
        new_password: &Password,
    ) -> Result<(), ServiceError> {
        let mut identity = self
            .store
            .find_identity(principal.identity.id)
            .await?
            .ok_or_else(|| reject(AuthFailure::UnknownIdentity))?;

        let stored = identity
            .password_hash
            .as_deref()
            .map(PasswordHashString::new)
            .ok_or(ServiceError::NotPasswordBacked)?;

        if !verify_password(current, &stored) {
            tracing::warn!(user_id = %identity.id, "Current password mismatch");
            return Err(reject(AuthFailure::BadPassword));
        }

        if current.as_str() == new_password.as_str() {
            return Err(ServiceError::PasswordUnchanged);
        }

        self.check_new_password(&identity, new_password)?;

        identity.rotate_password(hash_password(new_password)?.into_string());
        self.store.save_identity(&identity).await?;

        tracing::info!(user_id = %identity.id, "Password changed");
        Ok(())
    }

    /// Log in with a federated provider proof, creating the identity on
    /// first sight when registration is open.
    pub async fn social_login(
        &self,
        provider: &str,
        proof: &str,
    ) -> Result<TokenPair, ServiceError> {
        let provider: FederatedProvider = provider.parse()?;
        let email = self.exchange.exchange(provider, proof).await?;

        let mut identity = match self.store.find_identity_by_email(&email).await? {
            Some(identity) => identity,
            None if self.allow_new_users => {
                let identity = Identity::new_federated(email, provider.identity_source());
                self.store.insert_identity(&identity).await?;
                tracing::info!(
                    user_id = %identity.id,
                    provider = provider.as_str(),
                    "Identity created from federated login"
                );
                identity
            }
            None => {
                tracing::warn!(
                    provider = provider.as_str(),
                    "Federated login for unknown identity refused"
                );
                return Err(ServiceError::RegistrationClosed);
            }
        };

        if !identity.is_active {
            return Err(reject(AuthFailure::InactiveIdentity));
        }

        identity.record_login(provider.as_str(), "social");
        self.store.save_identity(&identity).await?;

        self.issue_session_pair(&identity).await
    }

    async fn request_link(
        &self,
        email: &str,
        kind: MagicLinkKind,
    ) -> Result<MagicLink, ServiceError> {
        let identity = self
            .store
            .find_identity_by_email(email)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;

        if !identity.has_password() {
            return Err(ServiceError::NotPasswordBacked);
        }
        if !identity.is_active {
            return Err(reject(AuthFailure::InactiveIdentity));
        }

        let access = self.rbac.resolve_scopes_and_roles(&identity).await?;
        let token = self.tokens.issue_link_token(
            &identity.email,
            self.magic_links.link_ttl(),
            &access.scopes,
            &access.roles,
        )?;

        // A throttled request drops the minted token unsent.
        let link = self.magic_links.request(&identity, kind, &token.token).await?;

        let notification_kind = match kind {
            MagicLinkKind::Magic => NotificationKind::MagicLink,
            MagicLinkKind::Recovery => NotificationKind::PasswordRecovery,
        };
        self.notify(&identity.email, notification_kind, token.token)
            .await;

        Ok(link)
    }

    fn check_new_password(
        &self,
        identity: &Identity,
        new_password: &Password,
    ) -> Result<(), ServiceError> {
        self.policy
            .check(new_password.as_str())
            .map_err(ServiceError::WeakPassword)?;

        if matches_any(new_password, identity.known_password_hashes()) {
            tracing::warn!(user_id = %identity.id, "Password reuse rejected");
            return Err(ServiceError::PasswordReused);
        }
        Ok(())
    }

    async fn active_identity(&self, email: &str) -> Result<Identity, ServiceError> {
        let identity = self
            .store
            .find_identity_by_email(email)
            .await?
            .ok_or_else(|| reject(AuthFailure::UnknownIdentity))?;

        if !identity.is_active {
            return Err(reject(AuthFailure::InactiveIdentity));
        }
        Ok(identity)
    }

    async fn principal_from_claims(
        &self,
        claims: &TokenClaims,
    ) -> Result<Principal, ServiceError> {
        let identity = self.active_identity(&claims.sub).await?;

        let Some(client_id) = claims.client_id.as_deref() else {
            return Ok(Principal::session(identity));
        };

        let key = identity
            .api_key(client_id)
            .cloned()
            .ok_or_else(|| reject(AuthFailure::UnknownClient))?;
        if !key.active {
            tracing::warn!(client_id = %client_id, "Token presented for disabled API key");
            return Err(reject(AuthFailure::KeyDisabled));
        }
        Ok(Principal::api_key(identity, &key))
    }

    async fn issue_session_pair(&self, identity: &Identity) -> Result<TokenPair, ServiceError> {
        let access = self.rbac.resolve_scopes_and_roles(identity).await?;
        Ok(self
            .tokens
            .issue_pair(&identity.email, &access.scopes, &access.roles, None)?)
    }

    /// Delivery failures are logged, never surfaced.
    async fn notify(&self, recipient: &str, kind: NotificationKind, token: String) {
        let notification = LinkNotification {
            recipient: recipient.to_string(),
            kind,
            token,
        };
        if let Err(e) = self.notifier.send_link(&notification).await {
            tracing::error!(error = %e, kind = ?kind, "Failed to send link notification");
        }
    }
}

fn reject(reason: AuthFailure) -> ServiceError {
    tracing::debug!(reason = reason.as_str(), "Authentication rejected");
    ServiceError::AuthRejected(reason)
}
