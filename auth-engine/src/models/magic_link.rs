//! Magic link model - throttling and single-use record for out-of-band links.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Link kinds. Each (identity, kind) pair is throttled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MagicLinkKind {
    #[serde(rename = "magic_link")]
    Magic,
    #[serde(rename = "password_recovery")]
    Recovery,
}

impl MagicLinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MagicLinkKind::Magic => "magic_link",
            MagicLinkKind::Recovery => "password_recovery",
        }
    }
}

impl std::fmt::Display for MagicLinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicLinkPayload {
    pub expiry: DateTime<Utc>,
}

/// Observable state of the latest record for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicLinkState {
    Issued,
    Expired,
    Consumed,
}

/// Magic link record. Only the most recent record for a pair is actionable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicLink {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub kind: MagicLinkKind,
    pub created_at: DateTime<Utc>,
    /// Set on successful issuance, not on redemption.
    pub granted: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the token embedded in the delivered link.
    pub token_hash: String,
    pub payload: MagicLinkPayload,
}

impl MagicLink {
    /// Build a freshly issued record expiring `ttl` after `now`, bound to the
    /// link token whose digest is `token_hash`.
    pub fn issue(
        identity_id: Uuid,
        kind: MagicLinkKind,
        token_hash: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_id,
            kind,
            created_at: now,
            granted: true,
            consumed_at: None,
            token_hash,
            payload: MagicLinkPayload { expiry: now + ttl },
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.payload.expiry <= now
    }

    /// True while a new request for the same pair must be refused.
    pub fn within_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        now - self.created_at < cooldown
    }

    /// Seconds until the cooldown for this record elapses, rounded up.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> u64 {
        let remaining = (self.created_at + cooldown) - now;
        let millis = remaining.num_milliseconds().max(0) as u64;
        millis.div_ceil(1000)
    }

    /// True when `token_hash` is the digest this record was issued for.
    pub fn is_bound_to(&self, token_hash: &str) -> bool {
        !self.token_hash.is_empty() && self.token_hash == token_hash
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> MagicLinkState {
        if self.consumed_at.is_some() {
            MagicLinkState::Consumed
        } else if self.is_expired_at(now) {
            MagicLinkState::Expired
        } else {
            MagicLinkState::Issued
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_window() {
        let now = Utc::now();
        let link = MagicLink::issue(
            Uuid::new_v4(),
            MagicLinkKind::Magic,
            "digest".into(),
            now,
            Duration::minutes(60),
        );
        let cooldown = Duration::seconds(60);

        assert!(link.granted);
        assert!(link.within_cooldown(now + Duration::seconds(59), cooldown));
        assert!(!link.within_cooldown(now + Duration::seconds(60), cooldown));
        assert_eq!(link.cooldown_remaining(now + Duration::milliseconds(500), cooldown), 60);
        assert_eq!(link.cooldown_remaining(now + Duration::seconds(90), cooldown), 0);
    }

    #[test]
    fn test_state_transitions() {
        let now = Utc::now();
        let mut link = MagicLink::issue(
            Uuid::new_v4(),
            MagicLinkKind::Recovery,
            "digest".into(),
            now,
            Duration::minutes(5),
        );

        assert_eq!(link.state_at(now), MagicLinkState::Issued);
        assert_eq!(link.state_at(now + Duration::minutes(5)), MagicLinkState::Expired);

        link.consumed_at = Some(now);
        assert_eq!(link.state_at(now), MagicLinkState::Consumed);
    }

    #[test]
    fn test_token_binding() {
        let link = MagicLink::issue(
            Uuid::new_v4(),
            MagicLinkKind::Magic,
            "abc".into(),
            Utc::now(),
            Duration::minutes(5),
        );
        assert!(link.is_bound_to("abc"));
        assert!(!link.is_bound_to("abd"));
        assert!(!link.is_bound_to(""));
    }

    #[test]
    fn test_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&MagicLinkKind::Recovery).unwrap(),
            "\"password_recovery\""
        );
    }
}
