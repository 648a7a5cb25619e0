use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::MagicLinkConfig;
use crate::models::{Identity, MagicLink, MagicLinkKind, MagicLinkState};
use crate::utils::digest_token;

use super::error::{AuthFailure, ServiceError};
use super::store::{ConditionalInsert, IdentityStore};

/// Issues, throttles and consumes magic link records.
///
/// The record stores only a digest of the link token the caller minted for
/// it. Redemption must present that exact token for the same kind.
#[derive(Clone)]
pub struct MagicLinkManager {
    store: Arc<dyn IdentityStore>,
    expiry: Duration,
    cooldown: Duration,
}

impl MagicLinkManager {
    pub fn new(store: Arc<dyn IdentityStore>, config: &MagicLinkConfig) -> Self {
        Self {
            store,
            expiry: Duration::minutes(config.expiry_minutes),
            cooldown: Duration::seconds(config.cooldown_seconds),
        }
    }

    /// Lifetime of both the record and the token embedded in the link.
    pub fn link_ttl(&self) -> Duration {
        self.expiry
    }

    /// Persist a fresh record unless the latest one for the pair is inside
    /// the cooldown window. An older unconsumed record is simply superseded.
    pub async fn request(
        &self,
        identity: &Identity,
        kind: MagicLinkKind,
        link_token: &str,
    ) -> Result<MagicLink, ServiceError> {
        let now = Utc::now();
        let link = MagicLink::issue(identity.id, kind, digest_token(link_token), now, self.expiry);

        match self
            .store
            .insert_magic_link_if_idle(&link, self.cooldown)
            .await?
        {
            ConditionalInsert::Inserted => {
                tracing::info!(user_id = %identity.id, kind = %kind, "Magic link issued");
                Ok(link)
            }
            ConditionalInsert::Blocked { latest } => {
                let retry_after_seconds = latest.cooldown_remaining(now, self.cooldown).max(1);
                tracing::warn!(
                    user_id = %identity.id,
                    kind = %kind,
                    retry_after_seconds,
                    "Magic link requested within cooldown"
                );
                Err(ServiceError::TooSoon {
                    retry_after_seconds,
                })
            }
        }
    }

    /// Consume the latest record for the pair. The presented token must be the
    /// one bound to that record, so superseded links and tokens of another
    /// kind are dead.
    pub async fn redeem(
        &self,
        identity: &Identity,
        kind: MagicLinkKind,
        link_token: &str,
    ) -> Result<MagicLink, ServiceError> {
        let unavailable = || ServiceError::AuthRejected(AuthFailure::LinkUnavailable);
        let now = Utc::now();

        let mut latest = self
            .store
            .latest_magic_link(identity.id, kind)
            .await?
            .ok_or_else(unavailable)?;

        let state = latest.state_at(now);
        if state != MagicLinkState::Issued {
            tracing::warn!(user_id = %identity.id, kind = %kind, state = ?state, "Magic link not redeemable");
            return Err(unavailable());
        }

        if !latest.is_bound_to(&digest_token(link_token)) {
            tracing::warn!(user_id = %identity.id, kind = %kind, "Magic link token does not match");
            return Err(unavailable());
        }

        if !self.store.consume_magic_link(latest.id, now).await? {
            tracing::warn!(user_id = %identity.id, kind = %kind, "Magic link already consumed");
            return Err(unavailable());
        }

        latest.consumed_at = Some(now);
        tracing::info!(user_id = %identity.id, kind = %kind, "Magic link consumed");
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStore;

    fn manager(cooldown_seconds: i64) -> MagicLinkManager {
        MagicLinkManager::new(
            Arc::new(InMemoryStore::new()),
            &MagicLinkConfig {
                expiry_minutes: 60,
                cooldown_seconds,
            },
        )
    }

    fn identity() -> Identity {
        Identity::new_basic("a@example.com".into(), "h".into(), None)
    }

    #[tokio::test]
    async fn test_second_request_too_soon() {
        let manager = manager(60);
        let identity = identity();

        let first = manager
            .request(&identity, MagicLinkKind::Magic, "link-1")
            .await
            .unwrap();
        assert!(first.granted);

        let err = manager
            .request(&identity, MagicLinkKind::Magic, "link-2")
            .await
            .unwrap_err();
        match err {
            ServiceError::TooSoon {
                retry_after_seconds,
            } => assert!((1..=60).contains(&retry_after_seconds)),
            other => panic!("expected TooSoon, got {:?}", other),
        }

        // Kinds are throttled independently.
        assert!(manager
            .request(&identity, MagicLinkKind::Recovery, "link-3")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_redeem_is_single_use() {
        let manager = manager(0);
        let identity = identity();

        manager
            .request(&identity, MagicLinkKind::Magic, "link-1")
            .await
            .unwrap();

        let consumed = manager
            .redeem(&identity, MagicLinkKind::Magic, "link-1")
            .await
            .unwrap();
        assert!(consumed.consumed_at.is_some());

        let err = manager
            .redeem(&identity, MagicLinkKind::Magic, "link-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AuthRejected(AuthFailure::LinkUnavailable)));
    }

    #[tokio::test]
    async fn test_superseded_token_rejected() {
        let manager = manager(0);
        let identity = identity();

        manager
            .request(&identity, MagicLinkKind::Magic, "link-1")
            .await
            .unwrap();
        manager
            .request(&identity, MagicLinkKind::Magic, "link-2")
            .await
            .unwrap();

        let err = manager
            .redeem(&identity, MagicLinkKind::Magic, "link-1")
            .await
            .unwrap_err();
        assert!(err.is_auth_rejection());

        assert!(manager
            .redeem(&identity, MagicLinkKind::Magic, "link-2")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_token_of_other_kind_rejected() {
        let manager = manager(60);
        let identity = identity();

        manager
            .request(&identity, MagicLinkKind::Magic, "magic-token")
            .await
            .unwrap();
        manager
            .request(&identity, MagicLinkKind::Recovery, "recovery-token")
            .await
            .unwrap();

        for (kind, token) in [
            (MagicLinkKind::Magic, "recovery-token"),
            (MagicLinkKind::Recovery, "magic-token"),
        ] {
            let err = manager.redeem(&identity, kind, token).await.unwrap_err();
            assert!(err.is_auth_rejection(), "{} accepted {}", kind, token);
        }

        // Both records are still pending for their own tokens.
        assert!(manager
            .redeem(&identity, MagicLinkKind::Magic, "magic-token")
            .await
            .is_ok());
        assert!(manager
            .redeem(&identity, MagicLinkKind::Recovery, "recovery-token")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_redeem_without_request() {
        let manager = manager(60);
        let err = manager
            .redeem(&identity(), MagicLinkKind::Recovery, "anything")
            .await
            .unwrap_err();
        assert!(err.is_auth_rejection());
    }
}
