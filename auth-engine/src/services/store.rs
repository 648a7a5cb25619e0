use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Identity, MagicLink, MagicLinkKind, Role};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Duplicate(&'static str),

    #[error("Store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Outcome of an atomic check-and-insert of a magic link record.
#[derive(Debug, Clone)]
pub enum ConditionalInsert {
    Inserted,
    /// The latest record for the pair is still inside the cooldown window.
    Blocked { latest: MagicLink },
}

/// Persistence collaborator. Implementations must enforce uniqueness of
/// identity email, role name and API key client id.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;
    /// Every identity owning a key with this client id. More than one is a fault.
    async fn find_identities_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Vec<Identity>, StoreError>;
    async fn find_identities_with_role(&self, role_id: Uuid) -> Result<Vec<Identity>, StoreError>;
    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError>;
    async fn save_identity(&self, identity: &Identity) -> Result<(), StoreError>;
    async fn delete_identity(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Atomically strip one role reference from one identity.
    async fn pull_role(&self, identity_id: Uuid, role_id: Uuid) -> Result<bool, StoreError>;

    async fn find_role(&self, id: Uuid) -> Result<Option<Role>, StoreError>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;
    async fn find_roles(&self, ids: &[Uuid]) -> Result<Vec<Role>, StoreError>;
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;
    async fn insert_role(&self, role: &Role) -> Result<(), StoreError>;
    async fn save_role(&self, role: &Role) -> Result<(), StoreError>;
    async fn delete_role(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn latest_magic_link(
        &self,
        identity_id: Uuid,
        kind: MagicLinkKind,
    ) -> Result<Option<MagicLink>, StoreError>;
    /// Insert `link` unless the latest record for the same pair was created
    /// less than `cooldown` before `link.created_at`. Check and insert are atomic.
    async fn insert_magic_link_if_idle(
        &self,
        link: &MagicLink,
        cooldown: Duration,
    ) -> Result<ConditionalInsert, StoreError>;
    /// Mark a record consumed. Returns false if it was already consumed or is unknown.
    async fn consume_magic_link(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

#[derive(Default)]
struct Inner {
    identities: HashMap<Uuid, Identity>,
    roles: HashMap<Uuid, Role>,
    magic_links: Vec<MagicLink>,
}

impl Inner {
    fn check_identity_unique(&self, identity: &Identity) -> Result<(), StoreError> {
        for other in self.identities.values().filter(|o| o.id != identity.id) {
            if other.email == identity.email {
                return Err(StoreError::Duplicate("Identity"));
            }
            let clash = identity
                .api_keys
                .iter()
                .any(|key| other.api_key(&key.client_id).is_some());
            if clash {
                return Err(StoreError::Duplicate("API key"));
            }
        }
        Ok(())
    }

    fn check_role_unique(&self, role: &Role) -> Result<(), StoreError> {
        let clash = self
            .roles
            .values()
            .any(|other| other.id != role.id && other.name == role.name);
        if clash {
            return Err(StoreError::Duplicate("Role"));
        }
        Ok(())
    }

    fn latest_link(&self, identity_id: Uuid, kind: MagicLinkKind) -> Option<&MagicLink> {
        self.magic_links
            .iter()
            .filter(|l| l.identity_id == identity_id && l.kind == kind)
            .max_by_key(|l| l.created_at)
    }
}

/// Process-local store guarded by a single mutex.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Store mutex poisoned: {}", e)))
    }

    /// Insert bypassing uniqueness checks, to simulate a corrupted backend.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&self, identity: Identity) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.identities.insert(identity.id, identity);
        }
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.lock()?.identities.get(&id).cloned())
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn find_identities_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Vec<Identity>, StoreError> {
        Ok(self
            .lock()?
            .identities
            .values()
            .filter(|i| i.api_key(client_id).is_some())
            .cloned()
            .collect())
    }

    async fn find_identities_with_role(&self, role_id: Uuid) -> Result<Vec<Identity>, StoreError> {
        Ok(self
            .lock()?
            .identities
            .values()
            .filter(|i| i.has_role(role_id))
            .cloned()
            .collect())
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.identities.contains_key(&identity.id) {
            return Err(StoreError::Duplicate("Identity"));
        }
        inner.check_identity_unique(identity)?;
        inner.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    async fn save_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.check_identity_unique(identity)?;
        inner.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    async fn delete_identity(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let removed = inner.identities.remove(&id).is_some();
        if removed {
            inner.magic_links.retain(|l| l.identity_id != id);
        }
        Ok(removed)
    }

    async fn pull_role(&self, identity_id: Uuid, role_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        Ok(inner
            .identities
            .get_mut(&identity_id)
            .map(|identity| identity.remove_role(role_id))
            .unwrap_or(false))
    }

    async fn find_role(&self, id: Uuid) -> Result<Option<Role>, StoreError> {
        Ok(self.lock()?.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self
            .lock()?
            .roles
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn find_roles(&self, ids: &[Uuid]) -> Result<Vec<Role>, StoreError> {
        let inner = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.roles.get(id).cloned())
            .collect())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let mut roles: Vec<Role> = self.lock()?.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.check_role_unique(role)?;
        inner.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn save_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.check_role_unique(role)?;
        inner.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn delete_role(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.lock()?.roles.remove(&id).is_some())
    }

    async fn latest_magic_link(
        &self,
        identity_id: Uuid,
        kind: MagicLinkKind,
    ) -> Result<Option<MagicLink>, StoreError> {
        Ok(self.lock()?.latest_link(identity_id, kind).cloned())
    }

    async fn insert_magic_link_if_idle(
        &self,
        link: &MagicLink,
        cooldown: Duration,
    ) -> Result<ConditionalInsert, StoreError> {
        let mut inner = self.lock()?;
        if let Some(latest) = inner.latest_link(link.identity_id, link.kind) {
            if latest.within_cooldown(link.created_at, cooldown) {
                return Ok(ConditionalInsert::Blocked {
                    latest: latest.clone(),
                });
            }
        }
        inner.magic_links.push(link.clone());
        Ok(ConditionalInsert::Inserted)
    }

    async fn consume_magic_link(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner
            .magic_links
            .iter_mut()
            .find(|l| l.id == id && l.consumed_at.is_none())
        {
            Some(link) => {
                link.consumed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
