//! Federated identity exchange.
//!
//! A provider proof (Google ID token, Microsoft or Facebook access token) is
//! exchanged for a verified email handle. Google ID tokens are verified
//! locally against Google's published key set, cached in [`JwksCache`].

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::FederationConfig;
use crate::models::IdentitySource;

use super::error::{AuthFailure, ServiceError};

pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
pub const MICROSOFT_ME_URL: &str = "https://graph.microsoft.com/v1.0/me";
pub const FACEBOOK_ME_URL: &str = "https://graph.facebook.com/v13.0/me?fields=email";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Supported identity providers, selected by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FederatedProvider {
    Google,
    Microsoft,
    Facebook,
}

impl FederatedProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            FederatedProvider::Google => "google",
            FederatedProvider::Microsoft => "microsoft",
            FederatedProvider::Facebook => "facebook",
        }
    }

    pub fn identity_source(&self) -> IdentitySource {
        match self {
            FederatedProvider::Google => IdentitySource::Google,
            FederatedProvider::Microsoft => IdentitySource::Microsoft,
            FederatedProvider::Facebook => IdentitySource::Facebook,
        }
    }
}

impl FromStr for FederatedProvider {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(FederatedProvider::Google),
            "microsoft" => Ok(FederatedProvider::Microsoft),
            "facebook" => Ok(FederatedProvider::Facebook),
            _ => Err(ServiceError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Source of a provider's signing key set.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, anyhow::Error>;
}

pub struct HttpKeySetFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetFetcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<JwkSet, anyhow::Error> {
        let res = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fetch key set: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("Key set endpoint error: {}", e))?;

        res.json::<JwkSet>()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse key set: {}", e))
    }
}

/// In-memory key set cache. A miss triggers exactly one refresh and one retry.
pub struct JwksCache {
    fetcher: Arc<dyn KeySetFetcher>,
    keys: RwLock<Option<JwkSet>>,
}

impl JwksCache {
    pub fn new(fetcher: Arc<dyn KeySetFetcher>) -> Self {
        Self {
            fetcher,
            keys: RwLock::new(None),
        }
    }

    async fn cached(&self, kid: &str) -> Result<Option<DecodingKey>, ServiceError> {
        let guard = self.keys.read().await;
        match guard.as_ref().and_then(|set| set.find(kid)) {
            Some(jwk) => DecodingKey::from_jwk(jwk)
                .map(Some)
                .map_err(|e| ServiceError::Upstream(format!("Unusable provider key: {}", e))),
            None => Ok(None),
        }
    }

    pub async fn refresh(&self) -> Result<(), ServiceError> {
        let set = self.fetcher.fetch().await.map_err(|e| {
            tracing::error!(error = %e, "Provider key set refresh failed");
            ServiceError::Upstream(e.to_string())
        })?;
        tracing::debug!(keys = set.keys.len(), "Provider key set refreshed");
        *self.keys.write().await = Some(set);
        Ok(())
    }

    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, ServiceError> {
        if let Some(key) = self.cached(kid).await? {
            return Ok(key);
        }

        self.refresh().await?;
        self.cached(kid).await?.ok_or_else(|| {
            tracing::warn!(kid = %kid, "Unknown provider signing key");
            ServiceError::AuthRejected(AuthFailure::UnknownSigningKey)
        })
    }
}

#[derive(Debug, Deserialize)]
struct GoogleIdClaims {
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    mail: Option<String>,
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookUser {
    email: Option<String>,
}

/// Exchange a provider proof for a verified identity handle.
#[async_trait]
pub trait IdentityExchange: Send + Sync {
    async fn exchange(&self, provider: FederatedProvider, proof: &str)
        -> Result<String, ServiceError>;
}

pub struct FederatedExchange {
    client: reqwest::Client,
    google_client_id: Option<String>,
    google_keys: JwksCache,
    microsoft_me_url: String,
    facebook_me_url: String,
}

impl FederatedExchange {
    pub fn new(config: &FederationConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds.max(1)))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        let fetcher = Arc::new(HttpKeySetFetcher::new(client.clone(), GOOGLE_JWKS_URL));

        Ok(Self {
            google_keys: JwksCache::new(fetcher),
            client,
            google_client_id: config.google_client_id.clone(),
            microsoft_me_url: MICROSOFT_ME_URL.to_string(),
            facebook_me_url: FACEBOOK_ME_URL.to_string(),
        })
    }

    async fn verify_google_id_token(&self, id_token: &str) -> Result<String, ServiceError> {
        let client_id = self.google_client_id.as_deref().ok_or_else(|| {
            tracing::error!("Google login attempted without GOOGLE_CLIENT_ID");
            ServiceError::UnsupportedProvider(FederatedProvider::Google.as_str().to_string())
        })?;

        let header = decode_header(id_token).map_err(|_| ServiceError::TokenMalformed)?;
        let kid = header.kid.ok_or(ServiceError::TokenMalformed)?;
        let key = self.google_keys.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[client_id]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let claims = decode::<GoogleIdClaims>(id_token, &key, &validation)
            .map_err(|e| {
                tracing::warn!(error = %e, "Google ID token rejected");
                ServiceError::TokenMalformed
            })?
            .claims;

        match claims.email {
            Some(email) if claims.email_verified => Ok(email),
            _ => Err(ServiceError::AuthRejected(AuthFailure::UnknownIdentity)),
        }
    }

    async fn graph_get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, ServiceError> {
        let res = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Provider profile request failed");
                ServiceError::Upstream("Provider unreachable".to_string())
            })?;

        if res.status().is_client_error() {
            tracing::warn!(status = %res.status(), "Provider rejected access token");
            return Err(ServiceError::TokenMalformed);
        }
        if !res.status().is_success() {
            return Err(ServiceError::Upstream(format!(
                "Provider returned {}",
                res.status()
            )));
        }

        res.json::<T>().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse provider profile");
            ServiceError::Upstream("Invalid provider response".to_string())
        })
    }
}

#[async_trait]
impl IdentityExchange for FederatedExchange {
    async fn exchange(
        &self,
        provider: FederatedProvider,
        proof: &str,
    ) -> Result<String, ServiceError> {
        let email = match provider {
            FederatedProvider::Google => self.verify_google_id_token(proof).await?,
            FederatedProvider::Microsoft => {
                let user: GraphUser = self.graph_get(&self.microsoft_me_url, proof).await?;
                user.mail
                    .or(user.user_principal_name)
                    .ok_or(ServiceError::AuthRejected(AuthFailure::UnknownIdentity))?
            }
            FederatedProvider::Facebook => {
                let user: FacebookUser = self.graph_get(&self.facebook_me_url, proof).await?;
                user.email
                    .ok_or(ServiceError::AuthRejected(AuthFailure::UnknownIdentity))?
            }
        };

        tracing::info!(provider = provider.as_str(), "Federated proof exchanged");
        Ok(email)
    }
}

/// Fixed proof-to-email table, for wiring without network access.
#[derive(Default)]
pub struct StaticExchange {
    entries: HashMap<(FederatedProvider, String), String>,
}

impl StaticExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: FederatedProvider, proof: &str, email: &str) -> Self {
        self.entries
            .insert((provider, proof.to_string()), email.to_string());
        self
    }
}

#[async_trait]
impl IdentityExchange for StaticExchange {
    async fn exchange(
        &self,
        provider: FederatedProvider,
        proof: &str,
    ) -> Result<String, ServiceError> {
        self.entries
            .get(&(provider, proof.to_string()))
            .cloned()
            .ok_or(ServiceError::TokenMalformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // RFC 7517 example RSA public key.
    const N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";

    fn key_set(kids: &[&str]) -> JwkSet {
        let keys: Vec<serde_json::Value> = kids
            .iter()
            .map(|kid| {
                serde_json::json!({
                    "kty": "RSA",
                    "kid": kid,
                    "use": "sig",
                    "alg": "RS256",
                    "n": N,
                    "e": "AQAB",
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({ "keys": keys })).expect("valid key set")
    }

    /// Serves a scripted sequence of key sets and counts fetches.
    struct ScriptedFetcher {
        sets: Mutex<Vec<JwkSet>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(mut sets: Vec<JwkSet>) -> Self {
            sets.reverse();
            Self {
                sets: Mutex::new(sets),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl KeySetFetcher for ScriptedFetcher {
        async fn fetch(&self) -> Result<JwkSet, anyhow::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut sets = self.sets.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
            match sets.len() {
                0 => Err(anyhow::anyhow!("no more key sets")),
                1 => Ok(sets[0].clone()),
                _ => sets.pop().ok_or_else(|| anyhow::anyhow!("empty")),
            }
        }
    }

    #[tokio::test]
    async fn test_cache_hit_does_not_refetch() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![key_set(&["k1"])]));
        let cache = JwksCache::new(fetcher.clone());

        cache.decoding_key("k1").await.unwrap();
        cache.decoding_key("k1").await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_forces_single_refresh() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![key_set(&["k1"])]));
        let cache = JwksCache::new(fetcher.clone());
        cache.decoding_key("k1").await.unwrap();

        let err = cache
            .decoding_key("k9")
            .await
            .err()
            .expect("unknown kid rejected");
        assert!(matches!(
            err,
            ServiceError::AuthRejected(AuthFailure::UnknownSigningKey)
        ));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rotated_key_found_after_refresh() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            key_set(&["k1"]),
            key_set(&["k1", "k2"]),
        ]));
        let cache = JwksCache::new(fetcher.clone());
        cache.decoding_key("k1").await.unwrap();

        assert!(cache.decoding_key("k2").await.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_upstream_error() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let cache = JwksCache::new(fetcher);

        assert!(matches!(
            cache.decoding_key("k1").await,
            Err(ServiceError::Upstream(_))
        ));
    }

    #[test]
    fn test_provider_tags() {
        assert_eq!(
            "Google".parse::<FederatedProvider>().unwrap(),
            FederatedProvider::Google
        );
        assert_eq!(
            FederatedProvider::Facebook.identity_source(),
            IdentitySource::Facebook
        );
        assert!(matches!(
            "apple".parse::<FederatedProvider>(),
            Err(ServiceError::UnsupportedProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_google_requires_client_id() {
        let exchange = FederatedExchange::new(&FederationConfig {
            google_client_id: None,
            http_timeout_seconds: 1,
        })
        .unwrap();

        assert!(matches!(
            exchange.exchange(FederatedProvider::Google, "x.y.z").await,
            Err(ServiceError::UnsupportedProvider(_))
        ));
    }
}
