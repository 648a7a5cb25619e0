//! Identity model - a principal (human user or machine client owner).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiKey;

/// Number of prior password hashes retained for reuse detection.
pub const PASSWORD_HISTORY_LIMIT: usize = 5;

/// Where an identity was first established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    Basic,
    Google,
    Microsoft,
    Facebook,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentitySource::Basic => "basic",
            IdentitySource::Google => "google",
            IdentitySource::Microsoft => "microsoft",
            IdentitySource::Facebook => "facebook",
        }
    }
}

/// Most recent successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginActivity {
    pub at: DateTime<Utc>,
    pub source: String,
    pub provider: String,
}

/// Identity entity. Role references are ids, resolved on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    /// Stable unique handle (email).
    pub email: String,
    pub display_name: Option<String>,
    /// `None` for federated-only identities.
    pub password_hash: Option<String>,
    pub source: IdentitySource,
    pub api_keys: Vec<ApiKey>,
    pub role_ids: Vec<Uuid>,
    /// Prior password hashes, newest first.
    pub previous_password_hashes: Vec<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login: Option<LoginActivity>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Create a password-backed identity.
    pub fn new_basic(email: String, password_hash: String, display_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            display_name,
            password_hash: Some(password_hash),
            source: IdentitySource::Basic,
            api_keys: Vec::new(),
            role_ids: Vec::new(),
            previous_password_hashes: Vec::new(),
            is_active: true,
            email_verified: false,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    /// Create an identity on first federated login. The provider has verified the email.
    pub fn new_federated(email: String, source: IdentitySource) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            display_name: None,
            password_hash: None,
            source,
            api_keys: Vec::new(),
            role_ids: Vec::new(),
            previous_password_hashes: Vec::new(),
            is_active: true,
            email_verified: true,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    /// Password-backed accounts may use magic links and recovery.
    pub fn has_password(&self) -> bool {
        self.source == IdentitySource::Basic || self.password_hash.is_some()
    }

    pub fn verification_pending(&self) -> bool {
        !self.email_verified
    }

    pub fn api_key(&self, client_id: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.client_id == client_id)
    }

    pub fn api_key_mut(&mut self, client_id: &str) -> Option<&mut ApiKey> {
        self.api_keys.iter_mut().find(|k| k.client_id == client_id)
    }

    pub fn has_role(&self, role_id: Uuid) -> bool {
        self.role_ids.contains(&role_id)
    }

    /// Remove a role reference. Returns true if it was present.
    pub fn remove_role(&mut self, role_id: Uuid) -> bool {
        let before = self.role_ids.len();
        self.role_ids.retain(|id| *id != role_id);
        self.role_ids.len() != before
    }

    /// Hashes a new password must not match: the current one plus the history.
    pub fn known_password_hashes(&self) -> impl Iterator<Item = &str> {
        self.password_hash
            .iter()
            .chain(self.previous_password_hashes.iter())
            .map(String::as_str)
    }

    /// Install a new password hash, pushing the old one onto the bounded history.
    pub fn rotate_password(&mut self, new_hash: String) {
        if let Some(old) = self.password_hash.replace(new_hash) {
            self.previous_password_hashes.insert(0, old);
            self.previous_password_hashes
                .truncate(PASSWORD_HISTORY_LIMIT);
        }
    }

    pub fn record_login(&mut self, source: &str, provider: &str) {
        self.last_login = Some(LoginActivity {
            at: Utc::now(),
            source: source.to_string(),
            provider: provider.to_string(),
        });
    }
}
