//! Root application configuration. One load step produces a validated
//! config object that is passed explicitly into every component; no
//! component reads the environment on its own (the feature-flag env tier
//! is the one contractual exception, see `comply-admission`).

use crate::error::{ComplyError, ComplyResult};
use serde::Deserialize;
use tracing::warn;

/// Development-only signing secret. Used when `SESSION_SIGNING_SECRET` is
/// unset; worthless in any deployment that matters.
pub const DEV_SIGNING_SECRET: &str = "comply-dev-signing-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(skip)]
    pub oidc: OidcConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Application session token settings. The secret is provisioned via
/// `SESSION_SIGNING_SECRET`; the fallback constant exists for local
/// development only.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

/// OpenID Connect provider settings, sourced from the `OIDC_*` environment
/// variables. The URL/client fields are required; absence is a
/// `ComplyError::Config`, never a silent default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OidcConfig {
    pub auth_url: String,
    pub token_url: String,
    pub jwks_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub client_secret: Option<String>,
    pub scope: String,
    pub http_timeout_ms: u64,
    pub jwks_cache_ttl_secs: u64,
}

fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_pool_size() -> u32 {
    32
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_signing_secret() -> String {
    DEV_SIGNING_SECRET.to_string()
}
fn default_session_ttl_secs() -> u64 {
    28_800 // 8 hours
}
fn default_scope() -> String {
    "openid email profile".to_string()
}
fn default_http_timeout_ms() -> u64 {
    10_000
}
fn default_jwks_cache_ttl_secs() -> u64 {
    3_600
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            pool_size: default_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signing_secret: default_signing_secret(),
            ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn required_env(name: &str) -> ComplyResult<String> {
    std::env::var(name)
        .map_err(|_| ComplyError::Config(format!("missing required environment variable {name}")))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl OidcConfig {
    /// Read the provider settings from the environment. Variable names are
    /// part of the deployment contract and are used verbatim.
    pub fn from_env() -> ComplyResult<Self> {
        Ok(Self {
            auth_url: required_env("OIDC_AUTH_URL")?,
            token_url: required_env("OIDC_TOKEN_URL")?,
            jwks_url: required_env("OIDC_JWKS_URL")?,
            client_id: required_env("OIDC_CLIENT_ID")?,
            redirect_uri: required_env("OIDC_REDIRECT_URI")?,
            client_secret: optional_env("OIDC_CLIENT_SECRET"),
            scope: optional_env("OIDC_SCOPE").unwrap_or_else(default_scope),
            http_timeout_ms: optional_env("OIDC_HTTP_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_http_timeout_ms),
            jwks_cache_ttl_secs: optional_env("OIDC_JWKS_CACHE_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_jwks_cache_ttl_secs),
        })
    }
}

impl AppConfig {
    /// Load configuration from environment variables: structured settings
    /// under the `COMPLY__` prefix, OIDC settings from their contractual
    /// `OIDC_*` names, session secret from `SESSION_SIGNING_SECRET`.
    pub fn load() -> ComplyResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("COMPLY")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let cfg = builder
            .build()
            .map_err(|e| ComplyError::Config(e.to_string()))?;
        let mut app: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| ComplyError::Config(e.to_string()))?;

        app.oidc = OidcConfig::from_env()?;

        if let Some(secret) = optional_env("SESSION_SIGNING_SECRET") {
            app.session.signing_secret = secret;
        } else {
            warn!("SESSION_SIGNING_SECRET not set; using the development fallback secret");
        }

        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so the process-global environment is touched once.
    #[test]
    fn test_oidc_config_from_env() {
        // Missing required vars surfaces a Config error naming the variable.
        std::env::remove_var("OIDC_AUTH_URL");
        let err = OidcConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("OIDC_AUTH_URL"));

        std::env::set_var("OIDC_AUTH_URL", "https://idp.example.com/authorize");
        std::env::set_var("OIDC_TOKEN_URL", "https://idp.example.com/token");
        std::env::set_var("OIDC_JWKS_URL", "https://idp.example.com/jwks.json");
        std::env::set_var("OIDC_CLIENT_ID", "comply-client");
        std::env::set_var("OIDC_REDIRECT_URI", "https://app.example.com/callback");
        std::env::remove_var("OIDC_CLIENT_SECRET");
        std::env::remove_var("OIDC_SCOPE");

        let cfg = OidcConfig::from_env().unwrap();
        assert_eq!(cfg.client_id, "comply-client");
        assert_eq!(cfg.client_secret, None);
        assert_eq!(cfg.scope, "openid email profile");
        assert_eq!(cfg.jwks_cache_ttl_secs, 3_600);

        std::env::set_var("OIDC_CLIENT_SECRET", "s3cret");
        std::env::set_var("OIDC_SCOPE", "openid");
        let cfg = OidcConfig::from_env().unwrap();
        assert_eq!(cfg.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.scope, "openid");
    }

    #[test]
    fn test_session_defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.signing_secret, DEV_SIGNING_SECRET);
        assert_eq!(session.ttl_secs, 28_800);
    }
}
