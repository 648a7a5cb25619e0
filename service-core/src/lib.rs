//! service-core: shared error, configuration and observability plumbing.
pub mod config;
pub mod error;
pub mod observability;

pub use tracing;
pub use validator;
