//! Administrative handlers. Every entry point requires the `admin` role.

use uuid::Uuid;
use validator::Validate;

use crate::dtos::admin::{
    AssignRolesRequest, CreateApiKeyRequest, CreateApiKeyResponse, CreateIdentityRequest,
    CreateRoleRequest, RoleDeletedResponse, SetActiveRequest, UpdateApiKeyRequest,
    UpdateRoleRequest,
};
use crate::dtos::auth::IdentityResponse;
use crate::dtos::MessageResponse;
use crate::models::{ApiKeySummary, Role};
use crate::services::{ApiKeyUpdate, NewIdentity, Principal, RoleUpdate};
use crate::utils::{generate_client_secret, Password};
use crate::AppState;
use service_core::error::AppError;

const GENERATED_SECRET_BYTES: usize = 32;

pub async fn create_role(
    state: &AppState,
    admin: &Principal,
    req: CreateRoleRequest,
) -> Result<Role, AppError> {
    state.auth.require_admin(admin).await?;
    req.validate()?;

    let role = state
        .roles
        .create_role(&req.name, &req.description, req.scopes, &admin.identity.email)
        .await?;
    Ok(role)
}

pub async fn update_role(
    state: &AppState,
    admin: &Principal,
    role_id: Uuid,
    req: UpdateRoleRequest,
) -> Result<Role, AppError> {
    state.auth.require_admin(admin).await?;
    req.validate()?;

    let role = state
        .roles
        .update_role(
            role_id,
            RoleUpdate {
                name: req.name,
                description: req.description,
                scopes: req.scopes,
            },
        )
        .await?;
    Ok(role)
}

pub async fn get_role(state: &AppState, admin: &Principal, name: &str) -> Result<Role, AppError> {
    state.auth.require_admin(admin).await?;
    Ok(state.roles.get_role_by_name(name).await?)
}

pub async fn list_roles(state: &AppState, admin: &Principal) -> Result<Vec<Role>, AppError> {
    state.auth.require_admin(admin).await?;
    Ok(state.roles.list_roles().await?)
}

/// Returns once the role is gone. Reference cleanup continues in the background.
pub async fn delete_role(
    state: &AppState,
    admin: &Principal,
    role_id: Uuid,
) -> Result<RoleDeletedResponse, AppError> {
    state.auth.require_admin(admin).await?;

    let deletion = state.roles.delete_role(role_id).await?;
    Ok(RoleDeletedResponse {
        message: "Role deleted".to_string(),
        affected_identities: deletion.affected_identities,
    })
}

/// Register an identity with roles granted up front.
pub async fn create_identity(
    state: &AppState,
    admin: &Principal,
    req: CreateIdentityRequest,
) -> Result<IdentityResponse, AppError> {
    state.auth.require_admin(admin).await?;
    req.validate()?;

    let identity = state
        .auth
        .register(NewIdentity {
            email: req.email,
            password: Password::new(req.password),
            display_name: req.display_name,
            role_ids: req.roles,
        })
        .await?;
    Ok(IdentityResponse::from(&identity))
}

pub async fn assign_roles(
    state: &AppState,
    admin: &Principal,
    identity_id: Uuid,
    req: AssignRolesRequest,
) -> Result<IdentityResponse, AppError> {
    state.auth.require_admin(admin).await?;
    req.validate()?;

    let (identity, _) = state.identities.assign_roles(identity_id, &req.roles).await?;
    Ok(IdentityResponse::from(&identity))
}

pub async fn set_active(
    state: &AppState,
    admin: &Principal,
    identity_id: Uuid,
    req: SetActiveRequest,
) -> Result<IdentityResponse, AppError> {
    state.auth.require_admin(admin).await?;

    let identity = state.identities.set_active(identity_id, req.active).await?;
    Ok(IdentityResponse::from(&identity))
}

pub async fn delete_identity(
    state: &AppState,
    admin: &Principal,
    identity_id: Uuid,
) -> Result<MessageResponse, AppError> {
    state.auth.require_admin(admin).await?;
    state.identities.delete_identity(identity_id).await?;
    Ok(MessageResponse::new("Identity deleted"))
}

/// Create a key for `identity_id`. A secret is generated when none is given
/// and returned only in this response.
pub async fn create_api_key(
    state: &AppState,
    admin: &Principal,
    identity_id: Uuid,
    req: CreateApiKeyRequest,
) -> Result<CreateApiKeyResponse, AppError> {
    state.auth.require_admin(admin).await?;
    req.validate()?;

    let client_secret = req
        .client_secret
        .unwrap_or_else(|| generate_client_secret(GENERATED_SECRET_BYTES));

    let key = state
        .api_keys
        .create_api_key(
            identity_id,
            &req.client_id,
            &Password::new(client_secret.clone()),
            req.scopes,
        )
        .await?;

    Ok(CreateApiKeyResponse { key, client_secret })
}

pub async fn update_api_key(
    state: &AppState,
    admin: &Principal,
    identity_id: Uuid,
    client_id: &str,
    req: UpdateApiKeyRequest,
) -> Result<ApiKeySummary, AppError> {
    state.auth.require_admin(admin).await?;
    req.validate()?;

    let key = state
        .api_keys
        .update_api_key(
            identity_id,
            client_id,
            ApiKeyUpdate {
                secret: req.client_secret.map(Password::new),
                scopes: req.scopes,
                active: req.active,
            },
        )
        .await?;
    Ok(key)
}

pub async fn delete_api_key(
    state: &AppState,
    admin: &Principal,
    identity_id: Uuid,
    client_id: &str,
) -> Result<MessageResponse, AppError> {
    state.auth.require_admin(admin).await?;
    state.api_keys.delete_api_key(identity_id, client_id).await?;
    Ok(MessageResponse::new("API key deleted"))
}

pub async fn list_api_keys(
    state: &AppState,
    admin: &Principal,
    identity_id: Uuid,
) -> Result<Vec<ApiKeySummary>, AppError> {
    state.auth.require_admin(admin).await?;
    Ok(state.api_keys.list_api_keys(identity_id).await?)
}
