use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Identity, IdentitySource};

/// Public self-registration. Roles are granted only through the admin surface,
/// and unknown fields such as `roles` are refused.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[validate(length(max = 128, message = "Display name is too long"))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ClientCredentialsRequest {
    #[validate(length(min = 1, message = "client_id is required"))]
    pub client_id: String,

    #[validate(length(min = 1, message = "client_secret is required"))]
    pub client_secret: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Magic link and password recovery requests.
#[derive(Debug, Deserialize, Validate)]
pub struct LinkRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RedeemLinkRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirm {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SocialLoginRequest {
    #[validate(length(min = 1, message = "Provider is required"))]
    pub provider: String,

    /// ID token (google) or access token (microsoft, facebook).
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

/// Public view of an identity. Never carries hashes.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub source: IdentitySource,
    pub roles: Vec<Uuid>,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            source: identity.source,
            roles: identity.role_ids.clone(),
            is_active: identity.is_active,
            email_verified: identity.email_verified,
            last_login: identity.last_login.as_ref().map(|l| l.at),
            created_at: identity.created_at,
        }
    }
}
