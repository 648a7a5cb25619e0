//! Role model - a named bundle of scopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role entity. `name` is globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Handle of the administrator that created the role.
    pub created_by: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Role name granting the global administrative override.
    pub const ADMIN: &'static str = "admin";

    /// Create a new role.
    pub fn new(name: String, description: String, created_by: String, scopes: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            created_by,
            scopes,
            created_at: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.name == Self::ADMIN
    }

    pub fn grants(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Scopes prefixed with the role name, e.g. `editor:content.write`.
    pub fn namespaced_scopes(&self) -> impl Iterator<Item = String> + '_ {
        self.scopes
            .iter()
            .map(move |scope| format!("{}:{}", self.name, scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_scopes() {
        let role = Role::new(
            "editor".into(),
            "Edits content".into(),
            "root@example.com".into(),
            vec!["content.write".into(), "content.read".into()],
        );

        let scopes: Vec<String> = role.namespaced_scopes().collect();
        assert_eq!(scopes, vec!["editor:content.write", "editor:content.read"]);
        assert!(!role.is_admin());
    }
}
