mod common;

use auth_engine::services::{Principal, ServiceError};
use auth_engine::utils::Password;
use common::{TestEngine, PASSWORD};

#[tokio::test]
async fn test_editor_login_carries_namespaced_scopes() {
    let engine = TestEngine::new();
    let editor = engine.role("editor", &["content.write"]).await;
    engine.identity("e@example.com", &[&editor]).await;

    let pair = engine
        .state
        .auth
        .login_with_password("e@example.com", &Password::new(PASSWORD))
        .await
        .unwrap();
    let claims = engine
        .state
        .auth
        .tokens()
        .validate_access_token(&pair.access_token)
        .unwrap();

    assert_eq!(claims.scopes, vec!["editor:content.write"]);
    assert_eq!(claims.roles, vec!["editor"]);
    assert!(claims.client_id.is_none());

    let principal = engine
        .state
        .auth
        .current_principal(&pair.access_token)
        .await
        .unwrap();
    assert!(engine
        .state
        .auth
        .authorize(&principal, "content.write")
        .await
        .is_ok());
    assert!(matches!(
        engine.state.auth.authorize(&principal, "content.delete").await,
        Err(ServiceError::MissingScope(scope)) if scope == "content.delete"
    ));
}

#[tokio::test]
async fn test_admin_role_grants_every_scope() {
    let engine = TestEngine::new();
    let admin = engine.admin().await;

    for scope in ["content.write", "billing.refund", "anything.at.all"] {
        assert!(engine.state.auth.authorize(&admin, scope).await.is_ok());
    }
    assert!(engine.state.auth.require_admin(&admin).await.is_ok());
}

#[tokio::test]
async fn test_identity_without_roles_denied() {
    let engine = TestEngine::new();
    let identity = engine.identity("a@example.com", &[]).await;
    let principal = Principal::session(identity);

    assert!(matches!(
        engine.state.auth.authorize(&principal, "content.read").await,
        Err(ServiceError::NoRoles)
    ));
    assert!(matches!(
        engine.state.auth.require_admin(&principal).await,
        Err(ServiceError::AdminRequired)
    ));
}

#[tokio::test]
async fn test_key_authorization_uses_only_key_scopes() {
    let engine = TestEngine::new();
    let admin_role = engine.role("admin", &[]).await;
    let owner = engine.identity("owner@example.com", &[&admin_role]).await;

    engine
        .state
        .api_keys
        .create_api_key(
            owner.id,
            "reporting",
            &Password::new("reporting-secret-1"),
            vec!["reports.read".to_string()],
        )
        .await
        .unwrap();

    let pair = engine
        .state
        .auth
        .login_with_api_key("reporting", &Password::new("reporting-secret-1"))
        .await
        .unwrap();
    let principal = engine
        .state
        .auth
        .current_principal(&pair.access_token)
        .await
        .unwrap();
    assert_eq!(principal.client_id(), Some("reporting"));

    assert!(engine
        .state
        .auth
        .authorize(&principal, "reports.read")
        .await
        .is_ok());
    // The owner's admin role does not widen the key.
    assert!(matches!(
        engine.state.auth.authorize(&principal, "reports.write").await,
        Err(ServiceError::MissingScope(_))
    ));
}

#[tokio::test]
async fn test_role_scope_change_applies_without_relogin() {
    let engine = TestEngine::new();
    let viewer = engine.role("viewer", &[]).await;
    let identity = engine.identity("v@example.com", &[&viewer]).await;
    let principal = Principal::session(identity);

    assert!(engine
        .state
        .auth
        .authorize(&principal, "content.read")
        .await
        .is_err());

    engine
        .state
        .roles
        .update_role(
            viewer.id,
            auth_engine::services::RoleUpdate {
                scopes: Some(vec!["content.read".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(engine
        .state
        .auth
        .authorize(&principal, "content.read")
        .await
        .is_ok());
}
