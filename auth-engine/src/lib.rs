pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::services::{
    ApiKeyService, AuthService, AuthServiceParts, FederatedExchange, IdentityExchange,
    IdentityService, IdentityStore, MagicLinkManager, NotificationSender, PasswordPolicy,
    RbacService, RoleService, TokenService,
};
use service_core::error::AppError;
use service_core::observability::init_tracing;

/// Everything a transport needs to serve requests. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn IdentityStore>,
    pub auth: AuthService,
    pub roles: RoleService,
    pub identities: IdentityService,
    pub api_keys: ApiKeyService,
    pub rbac: RbacService,
}

impl AppState {
    /// Wire the services over the given collaborators. The configuration is
    /// validated first.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn IdentityStore>,
        notifier: Arc<dyn NotificationSender>,
        exchange: Arc<dyn IdentityExchange>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let policy = PasswordPolicy::new(config.password_policy.clone());
        let auth = AuthService::new(AuthServiceParts {
            store: store.clone(),
            tokens: TokenService::new(&config.jwt),
            magic_links: MagicLinkManager::new(store.clone(), &config.magic_link),
            policy: policy.clone(),
            notifier,
            exchange,
            allow_new_users: config.allow_new_users,
        });

        tracing::info!(
            service = %config.service_name,
            environment = ?config.environment,
            allow_new_users = config.allow_new_users,
            "Auth engine initialized"
        );

        Ok(Self {
            roles: RoleService::new(store.clone()),
            identities: IdentityService::new(store.clone(), policy),
            api_keys: ApiKeyService::new(store.clone()),
            rbac: RbacService::new(store.clone()),
            auth,
            store,
            config,
        })
    }

    /// Wire with the HTTP-backed federated exchange built from `config`.
    pub fn with_federation(
        config: AuthConfig,
        store: Arc<dyn IdentityStore>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Result<Self, AppError> {
        let exchange = FederatedExchange::new(&config.federation).map_err(AppError::ConfigError)?;
        Self::new(config, store, notifier, Arc::new(exchange))
    }
}

/// Install the tracing subscriber described by `config`.
pub fn init_observability(config: &AuthConfig) {
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
}
