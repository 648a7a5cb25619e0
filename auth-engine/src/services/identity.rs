use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Identity, Role};
use crate::utils::{hash_password, Password};

use super::error::ServiceError;
use super::policy::PasswordPolicy;
use super::store::IdentityStore;

/// Input for a password-backed registration.
#[derive(Debug)]
pub struct NewIdentity {
    pub email: String,
    pub password: Password,
    pub display_name: Option<String>,
    pub role_ids: Vec<Uuid>,
}

/// Identity administration.
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn IdentityStore>,
    policy: PasswordPolicy,
}

impl IdentityService {
    pub fn new(store: Arc<dyn IdentityStore>, policy: PasswordPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn register(&self, new: NewIdentity) -> Result<Identity, ServiceError> {
        if self.store.find_identity_by_email(&new.email).await?.is_some() {
            return Err(ServiceError::Duplicate("Identity"));
        }

        for role_id in &new.role_ids {
            if self.store.find_role(*role_id).await?.is_none() {
                tracing::warn!(role_id = %role_id, "Registration references unknown role");
                return Err(ServiceError::NotFound("Role"));
            }
        }

        self.policy
            .check(new.password.as_str())
            .map_err(ServiceError::WeakPassword)?;

        let hash = hash_password(&new.password)?;
        let mut identity = Identity::new_basic(new.email, hash.into_string(), new.display_name);
        identity.role_ids = new.role_ids;

        self.store.insert_identity(&identity).await?;
        tracing::info!(user_id = %identity.id, "Identity registered");
        Ok(identity)
    }

    pub async fn get_identity(&self, id: Uuid) -> Result<Identity, ServiceError> {
        self.store
            .find_identity(id)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Identity, ServiceError> {
        self.store
            .find_identity_by_email(email)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))
    }

    /// Replace the identity's roles with the named ones.
    pub async fn assign_roles(
        &self,
        identity_id: Uuid,
        role_names: &[String],
    ) -> Result<(Identity, Vec<Role>), ServiceError> {
        let mut identity = self.get_identity(identity_id).await?;

        let mut roles = Vec::with_capacity(role_names.len());
        for name in role_names {
            let role = self
                .store
                .find_role_by_name(name)
                .await?
                .ok_or(ServiceError::NotFound("Role"))?;
            roles.push(role);
        }

        identity.role_ids = roles.iter().map(|r| r.id).collect();
        self.store.save_identity(&identity).await?;

        tracing::info!(user_id = %identity.id, roles = ?role_names, "Roles assigned");
        Ok((identity, roles))
    }

    pub async fn set_active(&self, identity_id: Uuid, active: bool) -> Result<Identity, ServiceError> {
        let mut identity = self.get_identity(identity_id).await?;
        identity.is_active = active;
        self.store.save_identity(&identity).await?;

        tracing::info!(user_id = %identity.id, active, "Identity activation changed");
        Ok(identity)
    }

    /// Immediate and final. Outstanding tokens stay valid until they expire
    /// but no longer resolve to an identity.
    pub async fn delete_identity(&self, identity_id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete_identity(identity_id).await? {
            return Err(ServiceError::NotFound("Identity"));
        }
        tracing::info!(user_id = %identity_id, "Identity deleted");
        Ok(())
    }
}
