use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JwtConfig;
use crate::utils::generate_client_secret;

const BEARER_PREFIX: &str = "Bearer ";

/// Claim set carried by both access and refresh tokens. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (identity handle)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Originating API key, if the token was minted for a key-authenticated caller
    pub client_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Single-use nonce, present only on tokens minted for magic links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl TokenClaims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Token malformed")]
    Malformed,

    #[error("Token encoding failed: {0}")]
    Encoding(anyhow::Error),
}

/// Signing domain. A token minted in one domain never validates in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDomain {
    Access,
    Refresh,
}

impl KeyDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyDomain::Access => "access",
            KeyDomain::Refresh => "refresh",
        }
    }
}

/// Symmetric HS256 key.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    pub fn from_secret(secret: &Secret<String>) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(***)")
    }
}

/// A signed token and its absolute expiry.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token pair returned by every login, link and refresh entry point.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub access_token_expires: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires: DateTime<Utc>,
}

/// Drop an optional `Bearer ` prefix and surrounding whitespace.
pub fn strip_bearer(token: &str) -> &str {
    token.strip_prefix(BEARER_PREFIX).unwrap_or(token).trim()
}

pub fn encode_claims(claims: &TokenClaims, key: &SigningKey) -> Result<String, TokenError> {
    encode(&Header::new(Algorithm::HS256), claims, &key.encoding)
        .map_err(|e| TokenError::Encoding(anyhow::anyhow!("Failed to encode token: {}", e)))
}

/// Verify the signature and, when `verify_expiry` is set, the library-level expiry.
pub fn decode_claims(
    token: &str,
    key: &SigningKey,
    verify_expiry: bool,
) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = verify_expiry;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<TokenClaims>(strip_bearer(token), &key.decoding, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => {
                tracing::debug!(error = %e, "Token rejected");
                TokenError::Malformed
            }
        })
}

/// Decode, then re-check expiry on the claims. Both checks must pass.
pub fn validate_claims(token: &str, key: &SigningKey) -> Result<TokenClaims, TokenError> {
    let claims = decode_claims(token, key, true)?;
    if claims.is_expired_at(Utc::now()) {
        tracing::debug!(sub = %claims.sub, "Token expired according to claims");
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

/// Sign a fresh claim set with `iat = now`.
pub fn issue_token(
    subject: &str,
    expires_in: Duration,
    key: &SigningKey,
    client_id: Option<&str>,
    scopes: &[String],
    roles: &[String],
) -> Result<IssuedToken, TokenError> {
    sign_fresh(subject, expires_in, key, client_id, scopes, roles, None)
}

fn sign_fresh(
    subject: &str,
    expires_in: Duration,
    key: &SigningKey,
    client_id: Option<&str>,
    scopes: &[String],
    roles: &[String],
    jti: Option<String>,
) -> Result<IssuedToken, TokenError> {
    let now = Utc::now();
    let expires_at = now + expires_in;

    let claims = TokenClaims {
        sub: subject.to_string(),
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
        client_id: client_id.map(str::to_string),
        scopes: scopes.to_vec(),
        roles: roles.to_vec(),
        jti,
    };

    Ok(IssuedToken {
        token: encode_claims(&claims, key)?,
        expires_at,
    })
}

/// Issues and validates access/refresh tokens under two disjoint keys.
#[derive(Clone)]
pub struct TokenService {
    access_key: SigningKey,
    refresh_key: SigningKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_minutes: i64,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        tracing::info!(
            access_ttl_minutes = config.access_token_expiry_minutes,
            refresh_ttl_minutes = config.refresh_token_expiry_minutes,
            "Token service initialized with HS256 keys"
        );

        Self {
            access_key: SigningKey::from_secret(&config.access_secret),
            refresh_key: SigningKey::from_secret(&config.refresh_secret),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_minutes: config.refresh_token_expiry_minutes,
        }
    }

    pub fn key(&self, domain: KeyDomain) -> &SigningKey {
        match domain {
            KeyDomain::Access => &self.access_key,
            KeyDomain::Refresh => &self.refresh_key,
        }
    }

    /// Mint an access-domain token with an explicit lifetime.
    pub fn issue_access_token_for(
        &self,
        subject: &str,
        expires_in: Duration,
        client_id: Option<&str>,
        scopes: &[String],
        roles: &[String],
    ) -> Result<IssuedToken, TokenError> {
        issue_token(subject, expires_in, &self.access_key, client_id, scopes, roles)
    }

    /// Mint the access-domain token embedded in a magic link. A random `jti`
    /// keeps it distinct from any session token with the same claims.
    pub fn issue_link_token(
        &self,
        subject: &str,
        expires_in: Duration,
        scopes: &[String],
        roles: &[String],
    ) -> Result<IssuedToken, TokenError> {
        sign_fresh(
            subject,
            expires_in,
            &self.access_key,
            None,
            scopes,
            roles,
            Some(generate_client_secret(16)),
        )
    }

    pub fn issue_access_token(
        &self,
        subject: &str,
        client_id: Option<&str>,
        scopes: &[String],
        roles: &[String],
    ) -> Result<IssuedToken, TokenError> {
        self.issue_access_token_for(
            subject,
            Duration::minutes(self.access_token_expiry_minutes),
            client_id,
            scopes,
            roles,
        )
    }

    pub fn issue_refresh_token(
        &self,
        subject: &str,
        client_id: Option<&str>,
        scopes: &[String],
        roles: &[String],
    ) -> Result<IssuedToken, TokenError> {
        issue_token(
            subject,
            Duration::minutes(self.refresh_token_expiry_minutes),
            &self.refresh_key,
            client_id,
            scopes,
            roles,
        )
    }

    pub fn issue_pair(
        &self,
        subject: &str,
        scopes: &[String],
        roles: &[String],
        client_id: Option<&str>,
    ) -> Result<TokenPair, TokenError> {
        let access = self.issue_access_token(subject, client_id, scopes, roles)?;
        let refresh = self.issue_refresh_token(subject, client_id, scopes, roles)?;

        Ok(TokenPair {
            access_token: access.token,
            access_token_expires: access.expires_at,
            refresh_token: refresh.token,
            refresh_token_expires: refresh.expires_at,
        })
    }

    pub fn validate_access_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        validate_claims(token, &self.access_key)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        validate_claims(token, &self.refresh_key)
    }

    /// Mint a new access token from a refresh-domain token, carrying its claims over.
    pub fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, TokenError> {
        let claims = self.validate_refresh_token(refresh_token)?;
        self.issue_access_token(
            &claims.sub,
            claims.client_id.as_deref(),
            &claims.scopes,
            &claims.roles,
        )
    }

    /// Access token lifetime in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            access_secret: Secret::new("access-secret-for-tests".to_string()),
            refresh_secret: Secret::new("refresh-secret-for-tests".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_minutes: 60,
        }
    }

    #[test]
    fn test_bearer_prefix_is_stripped() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&test_config());
        let issued = service.issue_access_token("a@example.com", None, &[], &[])?;

        let claims = service.validate_access_token(&format!("Bearer {}", issued.token))?;
        assert_eq!(claims.sub, "a@example.com");

        Ok(())
    }

    #[test]
    fn test_expired_token_fails_both_checks() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&test_config());
        let key = service.key(KeyDomain::Access);
        let issued = issue_token("a@example.com", Duration::minutes(-5), key, None, &[], &[])?;

        assert!(matches!(
            decode_claims(&issued.token, key, true),
            Err(TokenError::Expired)
        ));

        // Library check disabled: the claims-level check still rejects.
        let claims = decode_claims(&issued.token, key, false)?;
        assert!(claims.is_expired_at(Utc::now()));
        assert!(matches!(
            service.validate_access_token(&issued.token),
            Err(TokenError::Expired)
        ));

        Ok(())
    }

    #[test]
    fn test_link_tokens_carry_distinct_nonces() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&test_config());
        let ttl = Duration::minutes(15);
        let session = service.issue_access_token("a@example.com", None, &[], &[])?;
        let first = service.issue_link_token("a@example.com", ttl, &[], &[])?;
        let second = service.issue_link_token("a@example.com", ttl, &[], &[])?;

        assert_ne!(first.token, second.token);
        assert_ne!(first.token, session.token);
        assert!(service.validate_access_token(&first.token)?.jti.is_some());
        assert!(service.validate_access_token(&session.token)?.jti.is_none());

        Ok(())
    }

    #[test]
    fn test_claims_check_rejects_exp_equal_to_now() {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: "a@example.com".into(),
            exp: now.timestamp(),
            iat: now.timestamp(),
            client_id: None,
            scopes: vec![],
            roles: vec![],
            jti: None,
        };
        assert!(claims.is_expired_at(now));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let service = TokenService::new(&test_config());
        assert!(matches!(
            service.validate_access_token("not.a.token"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            service.validate_access_token(""),
            Err(TokenError::Malformed)
        ));
    }

    #[test]
    fn test_refresh_carries_claims() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&test_config());
        let pair = service.issue_pair(
            "svc@example.com",
            &["editor:content.write".to_string()],
            &["editor".to_string()],
            Some("client-1"),
        )?;

        let fresh = service.refresh(&pair.refresh_token)?;
        let claims = service.validate_access_token(&fresh.token)?;
        assert_eq!(claims.client_id.as_deref(), Some("client-1"));
        assert_eq!(claims.roles, vec!["editor"]);

        assert!(matches!(
            service.refresh(&pair.access_token),
            Err(TokenError::Malformed)
        ));

        Ok(())
    }

    #[test]
    fn test_pair_serializes_camel_case() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&test_config());
        let pair = service.issue_pair("a@example.com", &[], &[], None)?;
        let json = serde_json::to_value(&pair)?;

        for field in [
            "accessToken",
            "accessTokenExpires",
            "refreshToken",
            "refreshTokenExpires",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(service.access_token_expiry_seconds(), 900);

        Ok(())
    }
}
