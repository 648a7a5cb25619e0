//! Services layer.
//!
//! Token codec, credential flows, magic links, role/scope resolution and the
//! collaborator seams (store, notifier, federated exchange).

mod api_key;
mod auth;
pub mod error;
pub mod federated;
mod identity;
pub mod jwt;
mod magic_link;
mod notification;
mod policy;
mod rbac;
mod role;
pub mod store;

pub use api_key::{ApiKeyService, ApiKeyUpdate};
pub use auth::{AuthService, AuthServiceParts};
pub use error::{AuthFailure, ServiceError};
pub use federated::{
    FederatedExchange, FederatedProvider, HttpKeySetFetcher, IdentityExchange, JwksCache,
    KeySetFetcher, StaticExchange,
};
pub use identity::{IdentityService, NewIdentity};
pub use jwt::{IssuedToken, KeyDomain, TokenClaims, TokenError, TokenPair, TokenService};
pub use magic_link::MagicLinkManager;
pub use notification::{
    LinkNotification, MockNotificationSender, NotificationKind, NotificationSender,
};
pub use policy::{PasswordPolicy, PolicyViolation};
pub use rbac::{
    evaluate_roles, resolve_from_roles, AuthenticatedVia, Principal, RbacService, ResolvedAccess,
};
pub use role::{cleanup_role_references, CleanupReport, RoleDeletion, RoleService, RoleUpdate};
pub use store::{ConditionalInsert, IdentityStore, InMemoryStore, StoreError};
