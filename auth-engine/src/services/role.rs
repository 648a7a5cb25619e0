use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::Role;

use super::error::ServiceError;
use super::store::IdentityStore;

/// Partial update of a role. `None` leaves the field untouched.
#[derive(Debug, Default, Clone)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub scopes: Option<Vec<String>>,
}

/// Result of the reference cleanup that follows a role deletion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub updated: usize,
    pub failed: usize,
}

/// A committed role deletion. Reference cleanup runs in the background.
#[derive(Debug)]
pub struct RoleDeletion {
    pub affected_identities: usize,
    pub cleanup: JoinHandle<CleanupReport>,
}

/// Strip `role_id` from every identity still referencing it.
pub async fn cleanup_role_references(
    store: Arc<dyn IdentityStore>,
    role_id: Uuid,
) -> CleanupReport {
    let holders = match store.find_identities_with_role(role_id).await {
        Ok(holders) => holders,
        Err(e) => {
            tracing::error!(role_id = %role_id, error = %e, "Failed to list role holders");
            return CleanupReport::default();
        }
    };

    let results = join_all(
        holders
            .iter()
            .map(|identity| store.pull_role(identity.id, role_id)),
    )
    .await;

    let mut report = CleanupReport::default();
    for (identity, result) in holders.iter().zip(results) {
        match result {
            Ok(_) => report.updated += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(
                    role_id = %role_id,
                    user_id = %identity.id,
                    error = %e,
                    "Failed to remove role reference"
                );
            }
        }
    }

    tracing::info!(
        role_id = %role_id,
        updated = report.updated,
        failed = report.failed,
        "Role reference cleanup finished"
    );
    report
}

#[derive(Clone)]
pub struct RoleService {
    store: Arc<dyn IdentityStore>,
}

impl RoleService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    pub async fn create_role(
        &self,
        name: &str,
        description: &str,
        scopes: Vec<String>,
        created_by: &str,
    ) -> Result<Role, ServiceError> {
        if self.store.find_role_by_name(name).await?.is_some() {
            return Err(ServiceError::Duplicate("Role"));
        }

        let role = Role::new(
            name.to_string(),
            description.to_string(),
            created_by.to_string(),
            scopes,
        );
        self.store.insert_role(&role).await?;

        tracing::info!(role_id = %role.id, role = %role.name, created_by = %created_by, "Role created");
        Ok(role)
    }

    pub async fn update_role(&self, role_id: Uuid, update: RoleUpdate) -> Result<Role, ServiceError> {
        let mut role = self.get_role_by_id(role_id).await?;

        if let Some(name) = update.name {
            if name != role.name && self.store.find_role_by_name(&name).await?.is_some() {
                return Err(ServiceError::Duplicate("Role"));
            }
            role.name = name;
        }
        if let Some(description) = update.description {
            role.description = description;
        }
        if let Some(scopes) = update.scopes {
            role.scopes = scopes;
        }

        self.store.save_role(&role).await?;
        tracing::info!(role_id = %role.id, role = %role.name, "Role updated");
        Ok(role)
    }

    pub async fn get_role_by_id(&self, role_id: Uuid) -> Result<Role, ServiceError> {
        self.store
            .find_role(role_id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<Role, ServiceError> {
        self.store
            .find_role_by_name(name)
            .await?
            .ok_or(ServiceError::NotFound("Role"))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, ServiceError> {
        Ok(self.store.list_roles().await?)
    }

    /// Delete the role, then spawn the reference cleanup. The delete is not
    /// transactional with the cleanup.
    pub async fn delete_role(&self, role_id: Uuid) -> Result<RoleDeletion, ServiceError> {
        let role = self.get_role_by_id(role_id).await?;
        let affected_identities = self.store.find_identities_with_role(role_id).await?.len();

        if !self.store.delete_role(role_id).await? {
            return Err(ServiceError::NotFound("Role"));
        }

        tracing::info!(
            role_id = %role_id,
            role = %role.name,
            affected_identities,
            "Role deleted, scheduling reference cleanup"
        );

        let store = self.store.clone();
        let cleanup = tokio::spawn(cleanup_role_references(store, role_id));

        Ok(RoleDeletion {
            affected_identities,
            cleanup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStore;

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let service = RoleService::new(Arc::new(InMemoryStore::new()));
        service
            .create_role("editor", "", vec![], "root@example.com")
            .await
            .unwrap();

        let err = service
            .create_role("editor", "again", vec![], "root@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate("Role")));
    }

    #[tokio::test]
    async fn test_rename_collision_rejected() {
        let service = RoleService::new(Arc::new(InMemoryStore::new()));
        service
            .create_role("editor", "", vec![], "root@example.com")
            .await
            .unwrap();
        let viewer = service
            .create_role("viewer", "", vec![], "root@example.com")
            .await
            .unwrap();

        let err = service
            .update_role(
                viewer.id,
                RoleUpdate {
                    name: Some("editor".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate("Role")));

        let updated = service
            .update_role(
                viewer.id,
                RoleUpdate {
                    scopes: Some(vec!["content.read".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.scopes, vec!["content.read"]);
    }

    #[tokio::test]
    async fn test_missing_role() {
        let service = RoleService::new(Arc::new(InMemoryStore::new()));
        assert!(matches!(
            service.get_role_by_name("ghost").await,
            Err(ServiceError::NotFound("Role"))
        ));
        assert!(matches!(
            service.delete_role(Uuid::new_v4()).await,
            Err(ServiceError::NotFound("Role"))
        ));
    }
}
