//! Shared setup for the auth-engine integration tests.
//!
//! Wires an [`AppState`] over the in-memory store, a recording notifier and a
//! fixed federated exchange.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use auth_engine::{
    config::{
        AuthConfig, Environment, FederationConfig, JwtConfig, MagicLinkConfig,
        PasswordPolicyConfig,
    },
    init_observability,
    models::{Identity, Role},
    services::{
        FederatedProvider, IdentityStore, InMemoryStore, MockNotificationSender, NewIdentity,
        NotificationKind, Principal, StaticExchange,
    },
    utils::Password,
    AppState,
};
use secrecy::Secret;

pub const PASSWORD: &str = "P@ssw0rd!";
pub const GOOGLE_PROOF: &str = "google-id-token";
pub const GOOGLE_EMAIL: &str = "social@example.com";

static TRACING: Once = Once::new();

pub fn test_config(cooldown_seconds: i64) -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config {
            otlp_endpoint: None,
        },
        environment: Environment::Dev,
        service_name: "auth-engine-test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        jwt: JwtConfig {
            access_secret: Secret::new("test-access-secret".to_string()),
            refresh_secret: Secret::new("test-refresh-secret".to_string()),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_minutes: 60,
        },
        magic_link: MagicLinkConfig {
            expiry_minutes: 60,
            cooldown_seconds,
        },
        password_policy: PasswordPolicyConfig::default(),
        federation: FederationConfig::default(),
        allow_new_users: true,
    }
}

pub struct TestEngine {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<MockNotificationSender>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(test_config(60))
    }

    pub fn with_cooldown(cooldown_seconds: i64) -> Self {
        Self::with_config(test_config(cooldown_seconds))
    }

    pub fn with_config(config: AuthConfig) -> Self {
        TRACING.call_once(|| init_observability(&config));

        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(MockNotificationSender::new());
        let exchange =
            StaticExchange::new().with(FederatedProvider::Google, GOOGLE_PROOF, GOOGLE_EMAIL);

        let state = AppState::new(
            config,
            store.clone(),
            notifier.clone(),
            Arc::new(exchange),
        )
        .expect("test configuration is valid");

        Self {
            state,
            store,
            notifier,
        }
    }

    /// Fetch the role by name, creating it with `scopes` if missing.
    pub async fn role(&self, name: &str, scopes: &[&str]) -> Role {
        if let Some(role) = self.store.find_role_by_name(name).await.unwrap() {
            return role;
        }
        self.state
            .roles
            .create_role(
                name,
                "",
                scopes.iter().map(|s| s.to_string()).collect(),
                "root@example.com",
            )
            .await
            .unwrap()
    }

    /// Register a password-backed identity holding the given roles.
    pub async fn identity(&self, email: &str, roles: &[&Role]) -> Identity {
        self.state
            .auth
            .register(NewIdentity {
                email: email.to_string(),
                password: Password::new(PASSWORD),
                display_name: None,
                role_ids: roles.iter().map(|r| r.id).collect(),
            })
            .await
            .unwrap()
    }

    pub async fn admin(&self) -> Principal {
        let admin_role = self.role(Role::ADMIN, &[]).await;
        let identity = self.identity("admin@example.com", &[&admin_role]).await;
        Principal::session(identity)
    }

    pub fn last_token(&self, kind: NotificationKind) -> String {
        self.notifier
            .last_token(kind)
            .expect("a notification of this kind was sent")
    }
}
