//! API key model - machine credential owned by a single identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// API key credential. `client_id` is unique across all identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub client_id: String,
    pub client_secret_hash: String,
    /// Literal scopes, not namespaced by role.
    pub scopes: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn new(client_id: String, client_secret_hash: String, scopes: Vec<String>) -> Self {
        Self {
            client_id,
            client_secret_hash,
            scopes,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn grants(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// API key view without the secret hash.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeySummary {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&ApiKey> for ApiKeySummary {
    fn from(key: &ApiKey) -> Self {
        Self {
            client_id: key.client_id.clone(),
            scopes: key.scopes.clone(),
            active: key.active,
            created_at: key.created_at,
        }
    }
}
