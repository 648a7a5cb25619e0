use validator::Validate;

use crate::dtos::auth::{
    ChangePasswordRequest, ClientCredentialsRequest, IdentityResponse, LinkRequest, LoginRequest,
    PasswordResetConfirm, RedeemLinkRequest, RefreshRequest, RegisterRequest, SocialLoginRequest,
};
use crate::dtos::MessageResponse;
use crate::services::{NewIdentity, Principal, TokenPair};
use crate::utils::Password;
use crate::AppState;
use service_core::error::AppError;

/// Anonymous self-registration. The identity starts without roles.
pub async fn register(
    state: &AppState,
    req: RegisterRequest,
) -> Result<IdentityResponse, AppError> {
    req.validate()?;

    let identity = state
        .auth
        .register(NewIdentity {
            email: req.email,
            password: Password::new(req.password),
            display_name: req.display_name,
            role_ids: Vec::new(),
        })
        .await?;
    Ok(IdentityResponse::from(&identity))
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<TokenPair, AppError> {
    req.validate()?;
    let pair = state
        .auth
        .login_with_password(&req.email, &Password::new(req.password))
        .await?;
    Ok(pair)
}

pub async fn client_credentials(
    state: &AppState,
    req: ClientCredentialsRequest,
) -> Result<TokenPair, AppError> {
    req.validate()?;
    let pair = state
        .auth
        .login_with_api_key(&req.client_id, &Password::new(req.client_secret))
        .await?;
    Ok(pair)
}

pub async fn refresh(state: &AppState, req: RefreshRequest) -> Result<TokenPair, AppError> {
    req.validate()?;
    Ok(state.auth.refresh(&req.refresh_token).await?)
}

/// Resolve a bearer access token (with or without the `Bearer ` prefix).
pub async fn authenticate(state: &AppState, bearer: &str) -> Result<Principal, AppError> {
    Ok(state.auth.current_principal(bearer).await?)
}

pub async fn me(state: &AppState, principal: &Principal) -> Result<IdentityResponse, AppError> {
    let identity = state.identities.get_identity(principal.identity.id).await?;
    Ok(IdentityResponse::from(&identity))
}

pub async fn request_magic_link(
    state: &AppState,
    req: LinkRequest,
) -> Result<MessageResponse, AppError> {
    req.validate()?;
    state.auth.request_magic_link(&req.email).await?;
    Ok(MessageResponse::new("Magic link sent"))
}

pub async fn redeem_magic_link(
    state: &AppState,
    req: RedeemLinkRequest,
) -> Result<TokenPair, AppError> {
    req.validate()?;
    Ok(state.auth.redeem_magic_link(&req.token).await?)
}

pub async fn request_password_reset(
    state: &AppState,
    req: LinkRequest,
) -> Result<MessageResponse, AppError> {
    req.validate()?;
    state.auth.request_password_recovery(&req.email).await?;
    Ok(MessageResponse::new("Password recovery link sent"))
}

pub async fn confirm_password_reset(
    state: &AppState,
    req: PasswordResetConfirm,
) -> Result<MessageResponse, AppError> {
    req.validate()?;
    state
        .auth
        .reset_password(&req.token, &Password::new(req.new_password))
        .await?;
    Ok(MessageResponse::new("Password has been reset"))
}

pub async fn change_password(
    state: &AppState,
    principal: &Principal,
    req: ChangePasswordRequest,
) -> Result<MessageResponse, AppError> {
    req.validate()?;
    state
        .auth
        .change_password(
            principal,
            &Password::new(req.current_password),
            &Password::new(req.new_password),
        )
        .await?;
    Ok(MessageResponse::new("Password changed"))
}

pub async fn social_login(
    state: &AppState,
    req: SocialLoginRequest,
) -> Result<TokenPair, AppError> {
    req.validate()?;
    Ok(state.auth.social_login(&req.provider, &req.token).await?)
}
