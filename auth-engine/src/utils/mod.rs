pub mod password;
pub mod secret;

pub use password::{hash_password, matches_any, verify_password, Password, PasswordHashString};
pub use secret::{digest_token, generate_client_secret};
