use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::ApiKeySummary;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "Role name must be 1-64 characters"))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "Role name must be 1-64 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub scopes: Option<Vec<String>>,
}

/// Admin-side registration, the only path that grants roles at creation.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateIdentityRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[validate(length(max = 128, message = "Display name is too long"))]
    pub display_name: Option<String>,

    #[serde(default)]
    pub roles: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRolesRequest {
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 3, max = 128, message = "client_id must be 3-128 characters"))]
    pub client_id: String,

    /// Generated when omitted.
    #[validate(length(min = 16, message = "client_secret must be at least 16 characters"))]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Returned once on key creation. The secret is not retrievable later.
#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    #[serde(flatten)]
    pub key: ApiKeySummary,
    pub client_secret: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateApiKeyRequest {
    #[validate(length(min = 16, message = "client_secret must be at least 16 characters"))]
    pub client_secret: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RoleDeletedResponse {
    pub message: String,
    pub affected_identities: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_role_validation() {
        let req: CreateRoleRequest = serde_json::from_str(r#"{"name":""}"#).unwrap();
        assert!(req.validate().is_err());

        let req: CreateRoleRequest =
            serde_json::from_str(r#"{"name":"editor","scopes":["content.write"]}"#).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.description, "");
    }

    #[test]
    fn test_optional_secret_validated_only_when_present() {
        let req = CreateApiKeyRequest {
            client_id: "ci-runner".into(),
            client_secret: None,
            scopes: vec![],
        };
        assert!(req.validate().is_ok());

        let req = CreateApiKeyRequest {
            client_id: "ci-runner".into(),
            client_secret: Some("short".into()),
            scopes: vec![],
        };
        assert!(req.validate().is_err());
    }
}
