pub mod api_key;
pub mod identity;
pub mod magic_link;
pub mod role;

pub use api_key::{ApiKey, ApiKeySummary};
pub use identity::{Identity, IdentitySource, LoginActivity, PASSWORD_HISTORY_LIMIT};
pub use magic_link::{MagicLink, MagicLinkKind, MagicLinkPayload, MagicLinkState};
pub use role::Role;
