use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

const DEFAULT_ACCESS_SECRET: &str = "change_me_access";
const DEFAULT_REFRESH_SECRET: &str = "change_me_refresh";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub jwt: JwtConfig,
    pub magic_link: MagicLinkConfig,
    pub password_policy: PasswordPolicyConfig,
    pub federation: FederationConfig,
    /// Whether a first federated login may create an identity.
    pub allow_new_users: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: Secret<String>,
    pub refresh_secret: Secret<String>,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct MagicLinkConfig {
    /// Lifetime of the bearer token embedded in a link.
    pub expiry_minutes: i64,
    /// Minimum gap between two requests for the same (identity, kind).
    pub cooldown_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct PasswordPolicyConfig {
    pub min_length: usize,
    pub min_uppercase: usize,
    pub min_numbers: usize,
    pub min_nonletters: usize,
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            min_uppercase: 1,
            min_numbers: 1,
            min_nonletters: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FederationConfig {
    pub google_client_id: Option<String>,
    pub http_timeout_seconds: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("auth-engine"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT")
                .ok()
                .or_else(|| common_config.otlp_endpoint.clone()),
            jwt: JwtConfig {
                access_secret: Secret::new(get_env(
                    "JWT_ACCESS_SECRET",
                    Some(DEFAULT_ACCESS_SECRET),
                    is_prod,
                )?),
                refresh_secret: Secret::new(get_env(
                    "JWT_REFRESH_SECRET",
                    Some(DEFAULT_REFRESH_SECRET),
                    is_prod,
                )?),
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "30",
                    is_prod,
                )?,
                refresh_token_expiry_minutes: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_MINUTES",
                    "60",
                    is_prod,
                )?,
            },
            magic_link: MagicLinkConfig {
                expiry_minutes: parse_env("MAGIC_LINK_EXPIRY_MINUTES", "60", is_prod)?,
                cooldown_seconds: parse_env("MAGIC_LINK_COOLDOWN_SECONDS", "60", is_prod)?,
            },
            password_policy: PasswordPolicyConfig {
                min_length: parse_env("PASSWORD_MIN_LENGTH", "8", is_prod)?,
                min_uppercase: parse_env("PASSWORD_MIN_UPPERCASE", "1", is_prod)?,
                min_numbers: parse_env("PASSWORD_MIN_NUMBERS", "1", is_prod)?,
                min_nonletters: parse_env("PASSWORD_MIN_NONLETTERS", "1", is_prod)?,
            },
            federation: FederationConfig {
                google_client_id: env::var("GOOGLE_CLIENT_ID").ok().filter(|v| !v.is_empty()),
                http_timeout_seconds: parse_env(
                    "FEDERATION_HTTP_TIMEOUT_SECONDS",
                    "10",
                    is_prod,
                )?,
            },
            allow_new_users: parse_env::<bool>("ALLOW_NEW_USERS", "true", is_prod)?,
            common: common_config,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.magic_link.expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAGIC_LINK_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.magic_link.cooldown_seconds < 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAGIC_LINK_COOLDOWN_SECONDS must not be negative"
            )));
        }

        let access = self.jwt.access_secret.expose_secret();
        let refresh = self.jwt.refresh_secret.expose_secret();

        if access.is_empty() || refresh.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT signing secrets must not be empty"
            )));
        }

        if access == refresh {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ"
            )));
        }

        if self.jwt.refresh_token_expiry_minutes < self.jwt.access_token_expiry_minutes {
            tracing::warn!("Refresh token lifetime is shorter than access token lifetime");
        }

        // In production, ensure stricter validation
        if self.environment == Environment::Prod
            && (access.starts_with("change_me") || refresh.starts_with("change_me"))
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Default JWT secrets are not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
