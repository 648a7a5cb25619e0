//! Role-to-scope resolution and the per-operation authorization guard.

use std::sync::Arc;

use crate::models::{ApiKey, Identity, Role};

use super::error::ServiceError;
use super::store::IdentityStore;

/// How the caller proved who they are. Produced by authentication, consumed
/// by authorization, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticatedVia {
    Session,
    ApiKey { client_id: String, scopes: Vec<String> },
}

/// An authenticated identity plus the credential path used for this call.
#[derive(Debug, Clone)]
pub struct Principal {
    pub identity: Identity,
    pub via: AuthenticatedVia,
}

impl Principal {
    pub fn session(identity: Identity) -> Self {
        Self {
            identity,
            via: AuthenticatedVia::Session,
        }
    }

    pub fn api_key(identity: Identity, key: &ApiKey) -> Self {
        Self {
            identity,
            via: AuthenticatedVia::ApiKey {
                client_id: key.client_id.clone(),
                scopes: key.scopes.clone(),
            },
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        match &self.via {
            AuthenticatedVia::ApiKey { client_id, .. } => Some(client_id),
            AuthenticatedVia::Session => None,
        }
    }
}

/// Effective permissions: role-namespaced scopes and role names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAccess {
    pub scopes: Vec<String>,
    pub roles: Vec<String>,
}

pub fn resolve_from_roles(roles: &[Role]) -> ResolvedAccess {
    ResolvedAccess {
        scopes: roles.iter().flat_map(Role::namespaced_scopes).collect(),
        roles: roles.iter().map(|r| r.name.clone()).collect(),
    }
}

/// Role-based decision: no roles denies, `admin` allows, otherwise the raw
/// scope must appear on at least one role.
pub fn evaluate_roles(roles: &[Role], required_scope: &str) -> Result<(), ServiceError> {
    if roles.is_empty() {
        return Err(ServiceError::NoRoles);
    }
    if roles.iter().any(Role::is_admin) {
        return Ok(());
    }
    if roles.iter().any(|r| r.grants(required_scope)) {
        return Ok(());
    }
    Err(ServiceError::MissingScope(required_scope.to_string()))
}

#[derive(Clone)]
pub struct RbacService {
    store: Arc<dyn IdentityStore>,
}

impl RbacService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Roles currently referenced by the identity. Dangling ids are skipped.
    pub async fn identity_roles(&self, identity: &Identity) -> Result<Vec<Role>, ServiceError> {
        if identity.role_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.find_roles(&identity.role_ids).await?)
    }

    pub async fn resolve_scopes_and_roles(
        &self,
        identity: &Identity,
    ) -> Result<ResolvedAccess, ServiceError> {
        let roles = self.identity_roles(identity).await?;
        Ok(resolve_from_roles(&roles))
    }

    /// Scope check for a single protected operation.
    pub async fn authorize(
        &self,
        principal: &Principal,
        required_scope: &str,
    ) -> Result<(), ServiceError> {
        let decision = match &principal.via {
            AuthenticatedVia::ApiKey { scopes, .. } => {
                if scopes.iter().any(|s| s == required_scope) {
                    Ok(())
                } else {
                    Err(ServiceError::MissingScope(required_scope.to_string()))
                }
            }
            AuthenticatedVia::Session => {
                let roles = self.identity_roles(&principal.identity).await?;
                evaluate_roles(&roles, required_scope)
            }
        };

        if let Err(e) = &decision {
            tracing::warn!(
                user_id = %principal.identity.id,
                client_id = ?principal.client_id(),
                required_scope = %required_scope,
                reason = %e,
                "Authorization denied"
            );
        }
        decision
    }

    /// Coarse gate for administrative surfaces. Holds for key-authenticated
    /// callers too when the owning identity is an administrator.
    pub async fn require_admin(&self, principal: &Principal) -> Result<(), ServiceError> {
        let roles = self.identity_roles(&principal.identity).await?;
        if roles.iter().any(Role::is_admin) {
            return Ok(());
        }

        tracing::warn!(
            user_id = %principal.identity.id,
            "Administrative access denied"
        );
        Err(ServiceError::AdminRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, scopes: &[&str]) -> Role {
        Role::new(
            name.to_string(),
            String::new(),
            "root@example.com".to_string(),
            scopes.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_same_scope_distinguishable_by_role() {
        let access = resolve_from_roles(&[role("editor", &["read"]), role("viewer", &["read"])]);
        assert_eq!(access.scopes, vec!["editor:read", "viewer:read"]);
        assert_eq!(access.roles, vec!["editor", "viewer"]);
    }

    #[test]
    fn test_no_roles_denied() {
        assert!(matches!(
            evaluate_roles(&[], "content.write"),
            Err(ServiceError::NoRoles)
        ));
    }

    #[test]
    fn test_admin_short_circuits() {
        assert!(evaluate_roles(&[role("admin", &[]), role("viewer", &["read"])], "anything").is_ok());
    }

    #[test]
    fn test_scope_matched_raw_not_namespaced() {
        let roles = [role("editor", &["content.write"])];
        assert!(evaluate_roles(&roles, "content.write").is_ok());
        assert!(matches!(
            evaluate_roles(&roles, "editor:content.write"),
            Err(ServiceError::MissingScope(_))
        ));
    }
}
