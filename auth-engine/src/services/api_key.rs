use std::sync::Arc;

use uuid::Uuid;

use crate::models::{ApiKey, ApiKeySummary};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

use super::error::{AuthFailure, ServiceError};
use super::rbac::Principal;
use super::store::IdentityStore;

/// Partial update of an API key. `None` leaves the field untouched.
#[derive(Debug, Default)]
pub struct ApiKeyUpdate {
    pub secret: Option<Password>,
    pub scopes: Option<Vec<String>>,
    pub active: Option<bool>,
}

/// Machine-credential verification and key administration.
#[derive(Clone)]
pub struct ApiKeyService {
    store: Arc<dyn IdentityStore>,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Verify a client id / secret pair. Checks run in a fixed order and the
    /// first failure wins.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &Password,
    ) -> Result<Principal, ServiceError> {
        let mut owners = self.store.find_identities_by_client_id(client_id).await?;

        if owners.len() > 1 {
            tracing::error!(
                client_id = %client_id,
                owners = owners.len(),
                "Client id owned by more than one identity"
            );
            return Err(ServiceError::ConsistencyFault(format!(
                "client id {} has {} owners",
                client_id,
                owners.len()
            )));
        }

        let identity = owners.pop().ok_or_else(|| {
            tracing::warn!(client_id = %client_id, "Unknown client id");
            ServiceError::AuthRejected(AuthFailure::UnknownClient)
        })?;

        if !identity.is_active {
            tracing::warn!(client_id = %client_id, user_id = %identity.id, "Key owner is inactive");
            return Err(ServiceError::AuthRejected(AuthFailure::InactiveIdentity));
        }

        let key = identity
            .api_key(client_id)
            .cloned()
            .ok_or(ServiceError::AuthRejected(AuthFailure::UnknownClient))?;

        if !key.active {
            tracing::warn!(client_id = %client_id, "API key is disabled");
            return Err(ServiceError::AuthRejected(AuthFailure::KeyDisabled));
        }

        let stored = PasswordHashString::new(key.client_secret_hash.as_str());
        if !verify_password(client_secret, &stored) {
            tracing::warn!(client_id = %client_id, "API key secret mismatch");
            return Err(ServiceError::AuthRejected(AuthFailure::BadSecret));
        }

        tracing::info!(client_id = %client_id, user_id = %identity.id, "API key authenticated");
        Ok(Principal::api_key(identity, &key))
    }

    pub async fn create_api_key(
        &self,
        identity_id: Uuid,
        client_id: &str,
        client_secret: &Password,
        scopes: Vec<String>,
    ) -> Result<ApiKeySummary, ServiceError> {
        if !self
            .store
            .find_identities_by_client_id(client_id)
            .await?
            .is_empty()
        {
            return Err(ServiceError::Duplicate("API key"));
        }

        let mut identity = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;

        let hash = hash_password(client_secret)?;
        let key = ApiKey::new(client_id.to_string(), hash.into_string(), scopes);
        let summary = ApiKeySummary::from(&key);

        identity.api_keys.push(key);
        self.store.save_identity(&identity).await?;

        tracing::info!(client_id = %client_id, user_id = %identity_id, "API key created");
        Ok(summary)
    }

    pub async fn update_api_key(
        &self,
        identity_id: Uuid,
        client_id: &str,
        update: ApiKeyUpdate,
    ) -> Result<ApiKeySummary, ServiceError> {
        let mut identity = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;

        let key = identity
            .api_key_mut(client_id)
            .ok_or(ServiceError::NotFound("API key"))?;

        if let Some(secret) = &update.secret {
            key.client_secret_hash = hash_password(secret)?.into_string();
        }
        if let Some(scopes) = update.scopes {
            key.scopes = scopes;
        }
        if let Some(active) = update.active {
            key.active = active;
        }
        let summary = ApiKeySummary::from(&*key);

        self.store.save_identity(&identity).await?;

        tracing::info!(client_id = %client_id, active = summary.active, "API key updated");
        Ok(summary)
    }

    pub async fn delete_api_key(&self, identity_id: Uuid, client_id: &str) -> Result<(), ServiceError> {
        let mut identity = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;

        let before = identity.api_keys.len();
        identity.api_keys.retain(|k| k.client_id != client_id);
        if identity.api_keys.len() == before {
            return Err(ServiceError::NotFound("API key"));
        }

        self.store.save_identity(&identity).await?;
        tracing::info!(client_id = %client_id, user_id = %identity_id, "API key deleted");
        Ok(())
    }

    pub async fn list_api_keys(&self, identity_id: Uuid) -> Result<Vec<ApiKeySummary>, ServiceError> {
        let identity = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;
        Ok(identity.api_keys.iter().map(ApiKeySummary::from).collect())
    }
}
