use service_core::error::AppError;
use thiserror::Error;

use super::jwt::TokenError;
use super::policy::PolicyViolation;
use super::store::StoreError;

/// Uniform message for every credential or token rejection.
pub const AUTH_REJECTED_MESSAGE: &str = "Authentication rejected";

/// Why an authentication attempt was refused. Internal only: every variant
/// surfaces with the same external message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    UnknownIdentity,
    UnknownClient,
    InactiveIdentity,
    KeyDisabled,
    BadSecret,
    BadPassword,
    NoPassword,
    LinkUnavailable,
    UnknownSigningKey,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::UnknownIdentity => "unknown_identity",
            AuthFailure::UnknownClient => "unknown_client",
            AuthFailure::InactiveIdentity => "inactive_identity",
            AuthFailure::KeyDisabled => "key_disabled",
            AuthFailure::BadSecret => "bad_secret",
            AuthFailure::BadPassword => "bad_password",
            AuthFailure::NoPassword => "no_password",
            AuthFailure::LinkUnavailable => "link_unavailable",
            AuthFailure::UnknownSigningKey => "unknown_signing_key",
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Authentication rejected")]
    AuthRejected(AuthFailure),

    #[error("Authentication rejected")]
    TokenExpired,

    #[error("Authentication rejected")]
    TokenMalformed,

    #[error("Too many requests, retry in {retry_after_seconds}s")]
    TooSoon { retry_after_seconds: u64 },

    #[error("Missing required scope: {0}")]
    MissingScope(String),

    #[error("No roles assigned")]
    NoRoles,

    #[error("Administrator role required")]
    AdminRequired,

    #[error("{0} already exists")]
    Duplicate(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),

    #[error("Password does not satisfy policy")]
    WeakPassword(Vec<PolicyViolation>),

    #[error("Password was used recently")]
    PasswordReused,

    #[error("New password must differ from the current one")]
    PasswordUnchanged,

    #[error("Account does not use password authentication")]
    NotPasswordBacked,

    #[error("Registration of new users is disabled")]
    RegistrationClosed,

    #[error("Unsupported identity provider: {0}")]
    UnsupportedProvider(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// True for any outcome reported to the caller as "authentication rejected".
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            ServiceError::AuthRejected(_) | ServiceError::TokenExpired | ServiceError::TokenMalformed
        )
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ServiceError::TokenExpired,
            TokenError::Malformed => ServiceError::TokenMalformed,
            TokenError::Encoding(e) => ServiceError::Internal(e),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => ServiceError::Duplicate(what),
            StoreError::Backend(e) => ServiceError::Internal(e),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::AuthRejected(_)
            | ServiceError::TokenExpired
            | ServiceError::TokenMalformed => {
                AppError::Unauthorized(anyhow::anyhow!(AUTH_REJECTED_MESSAGE))
            }
            ServiceError::TooSoon {
                retry_after_seconds,
            } => AppError::TooManyRequests(
                "Too many requests, please try again later".to_string(),
                Some(retry_after_seconds),
            ),
            ServiceError::MissingScope(_) | ServiceError::NoRoles | ServiceError::AdminRequired => {
                AppError::Forbidden(anyhow::anyhow!("Insufficient permissions"))
            }
            ServiceError::RegistrationClosed => {
                AppError::Forbidden(anyhow::anyhow!("Registration of new users is disabled"))
            }
            ServiceError::Duplicate(what) => {
                AppError::Conflict(anyhow::anyhow!("{} already exists", what))
            }
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::ConsistencyFault(detail) => {
                AppError::InternalError(anyhow::anyhow!("Consistency fault: {}", detail))
            }
            ServiceError::WeakPassword(violations) => {
                let reasons: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                AppError::BadRequest(anyhow::anyhow!(
                    "Password does not satisfy policy: {}",
                    reasons.join("; ")
                ))
            }
            ServiceError::PasswordReused => {
                AppError::BadRequest(anyhow::anyhow!("Password was used recently"))
            }
            ServiceError::PasswordUnchanged => AppError::BadRequest(anyhow::anyhow!(
                "New password must differ from the current one"
            )),
            ServiceError::NotPasswordBacked => AppError::BadRequest(anyhow::anyhow!(
                "Account does not use password authentication"
            )),
            ServiceError::UnsupportedProvider(tag) => {
                AppError::BadRequest(anyhow::anyhow!("Unsupported identity provider: {}", tag))
            }
            ServiceError::Upstream(e) => AppError::BadGateway(e),
            ServiceError::Validation(e) => AppError::ValidationError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_auth_failures_are_indistinguishable() {
        let variants = [
            ServiceError::AuthRejected(AuthFailure::BadPassword),
            ServiceError::AuthRejected(AuthFailure::UnknownIdentity),
            ServiceError::AuthRejected(AuthFailure::KeyDisabled),
            ServiceError::TokenExpired,
            ServiceError::TokenMalformed,
        ];

        let bodies: Vec<serde_json::Value> = variants
            .into_iter()
            .map(|e| {
                let app: AppError = e.into();
                assert_eq!(app.status_code(), StatusCode::UNAUTHORIZED);
                app.to_json()
            })
            .collect();

        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(bodies[0]["error"], AUTH_REJECTED_MESSAGE);
    }

    #[test]
    fn test_consistency_fault_is_server_error() {
        let app: AppError = ServiceError::ConsistencyFault("client id owned twice".into()).into();
        assert_eq!(app.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.body().error, "Internal server error");
    }

    #[test]
    fn test_too_soon_maps_to_rate_limit() {
        let app: AppError = ServiceError::TooSoon {
            retry_after_seconds: 12,
        }
        .into();
        assert_eq!(app.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(app.to_json()["retry_after"], 12);
    }

    #[test]
    fn test_reuse_distinct_from_weak_password() {
        let reused: AppError = ServiceError::PasswordReused.into();
        let weak: AppError = ServiceError::WeakPassword(vec![PolicyViolation::TooShort {
            min: 8,
        }])
        .into();

        assert_eq!(reused.status_code(), StatusCode::BAD_REQUEST);
        assert_ne!(reused.body().error, weak.body().error);
    }
}
