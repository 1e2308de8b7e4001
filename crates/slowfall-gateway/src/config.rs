//! Gateway configuration types.
//!
//! Configuration comes from environment variables. Parsing goes through a
//! lookup closure ([`GatewayConfig::from_lookup`]) so tests never touch the
//! process environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use slowfall_auth::keyvault::DEFAULT_AUTHORITY_HOST;
use slowfall_auth::{
    AuthError, AuthSettings, DevUser, KeyVaultSettings, VaultCredential, VaultError,
};
use slowfall_core::{GroupId, IdError};

use crate::bypass::DEFAULT_BYPASS_PREFIX;

/// Errors raised while loading configuration or wiring the gateway.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an unusable value.
    #[error("invalid {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The auth settings are inconsistent.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The vault client could not be built.
    #[error("key vault: {0}")]
    Vault(#[from] VaultError),

    /// A built-in identifier was rejected.
    #[error("invalid identifier: {0}")]
    Id(#[from] IdError),
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins. Empty means the local development origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Path prefix eligible for the development bypass.
    #[serde(default = "GatewayConfig::default_bypass_prefix")]
    pub dev_bypass_prefix: String,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Token and authorization settings.
    #[serde(skip)]
    pub auth: AuthSettings,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_bypass_prefix() -> String {
        DEFAULT_BYPASS_PREFIX.to_string()
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MiB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unusable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let dev_mode = get("SLOWFALL_DEV_MODE")
            .map(|v| parse_flag("SLOWFALL_DEV_MODE", &v))
            .transpose()?
            .unwrap_or(false);

        let allowed_group = get("SLOWFALL_ALLOWED_GROUP")
            .map(|v| {
                GroupId::new(v)
                    .map_err(|e| ConfigError::invalid("SLOWFALL_ALLOWED_GROUP", e.to_string()))
            })
            .transpose()?;

        let access_token_ttl = match get("SLOWFALL_ACCESS_TOKEN_TTL_SECONDS") {
            Some(v) => Duration::from_secs(parse_number("SLOWFALL_ACCESS_TOKEN_TTL_SECONDS", &v)?),
            None => defaults.auth.access_token_ttl,
        };
        let refresh_token_ttl = match get("SLOWFALL_REFRESH_TOKEN_TTL_DAYS") {
            Some(v) => {
                let days: u64 = parse_number("SLOWFALL_REFRESH_TOKEN_TTL_DAYS", &v)?;
                Duration::from_secs(days.saturating_mul(24 * 3600))
            }
            None => defaults.auth.refresh_token_ttl,
        };
        let credentials_cache_ttl = match get("SLOWFALL_CREDENTIALS_CACHE_TTL_SECONDS") {
            Some(v) => Duration::from_secs(parse_number(
                "SLOWFALL_CREDENTIALS_CACHE_TTL_SECONDS",
                &v,
            )?),
            None => defaults.auth.credentials_cache_ttl,
        };

        let dev_user = dev_mode.then(|| DevUser {
            username: get("SLOWFALL_DEV_USERNAME").unwrap_or_else(|| "dev".to_string()),
            password: get("SLOWFALL_DEV_PASSWORD").unwrap_or_else(|| "devpass".to_string()),
        });

        let auth = AuthSettings {
            issuer: get("SLOWFALL_ISSUER").unwrap_or(defaults.auth.issuer),
            access_token_ttl,
            refresh_token_ttl,
            allowed_group,
            dev_mode,
            signing_key_pem: get("SLOWFALL_SIGNING_KEY_PEM").map(PathBuf::from),
            key_vault: key_vault_settings(&get)?,
            credentials_cache_ttl,
            dev_user,
        };

        let cors_origins = get("SLOWFALL_CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let max_body_bytes = match get("SLOWFALL_MAX_BODY_BYTES") {
            Some(v) => parse_number("SLOWFALL_MAX_BODY_BYTES", &v)?,
            None => defaults.max_body_bytes,
        };
        let request_timeout_seconds = match get("SLOWFALL_REQUEST_TIMEOUT_SECONDS") {
            Some(v) => parse_number("SLOWFALL_REQUEST_TIMEOUT_SECONDS", &v)?,
            None => defaults.request_timeout_seconds,
        };

        Ok(Self {
            listen_addr: get("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            cors_origins,
            dev_bypass_prefix: get("SLOWFALL_DEV_BYPASS_PREFIX")
                .unwrap_or(defaults.dev_bypass_prefix),
            max_body_bytes,
            request_timeout_seconds,
            auth,
        })
    }

    /// Check for problems that must stop startup.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid(
                "LISTEN_ADDR",
                format!("not a socket address: {}", self.listen_addr),
            ));
        }
        if !(self.dev_bypass_prefix.starts_with('/') && self.dev_bypass_prefix.ends_with('/'))
            || self.dev_bypass_prefix.len() < 2
        {
            return Err(ConfigError::invalid(
                "SLOWFALL_DEV_BYPASS_PREFIX",
                "must start and end with '/'",
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::invalid("SLOWFALL_MAX_BODY_BYTES", "must be positive"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "SLOWFALL_REQUEST_TIMEOUT_SECONDS",
                "must be positive",
            ));
        }
        self.auth.validate()?;
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: Vec::new(),
            dev_bypass_prefix: Self::default_bypass_prefix(),
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            auth: AuthSettings::default(),
        }
    }
}

fn key_vault_settings(
    get: &impl Fn(&str) -> Option<String>,
) -> Result<Option<KeyVaultSettings>, ConfigError> {
    let key_name = get("AZURE_KEYVAULT_KEY_NAME");
    let credentials_secret = get("AZURE_KEYVAULT_CREDENTIALS_SECRET");

    let Some(vault_url) = get("AZURE_KEYVAULT_URL") else {
        if key_name.is_some() || credentials_secret.is_some() {
            return Err(ConfigError::invalid(
                "AZURE_KEYVAULT_URL",
                "required when a vault key or secret name is set",
            ));
        }
        return Ok(None);
    };

    let credential = if let Some(token) = get("AZURE_KEYVAULT_TOKEN") {
        VaultCredential::StaticToken(token)
    } else {
        match (
            get("AZURE_TENANT_ID"),
            get("AZURE_CLIENT_ID"),
            get("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                VaultCredential::ClientSecret {
                    authority_host: get("AZURE_AUTHORITY_HOST")
                        .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
                    tenant_id,
                    client_id,
                    client_secret,
                }
            }
            _ => {
                return Err(ConfigError::invalid(
                    "AZURE_CLIENT_SECRET",
                    "client credentials incomplete and no AZURE_KEYVAULT_TOKEN set",
                ))
            }
        }
    };

    Ok(Some(KeyVaultSettings {
        vault_url,
        key_name,
        credentials_secret,
        credential,
    }))
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(var, format!("expected a boolean, got {other:?}"))),
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(var, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.dev_bypass_prefix, "/api/dev/");
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn timeout_duration() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"cors_origins":["https://app.example.com"]}"#).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.cors_origins, vec!["https://app.example.com"]);
        assert_eq!(config.request_timeout_seconds, 30);
    }

    #[test]
    fn empty_environment_is_production_defaults() {
        let config = load(&[]).unwrap();
        assert!(!config.auth.dev_mode);
        assert!(config.auth.dev_user.is_none());
        assert!(config.auth.key_vault.is_none());
        assert_eq!(config.auth.access_token_ttl, Duration::from_secs(900));
        // No group and no key outside development.
        assert!(config.validate().is_err());
    }

    #[test]
    fn dev_mode_gets_dev_user() {
        let config = load(&[("SLOWFALL_DEV_MODE", "true")]).unwrap();
        let user = config.auth.dev_user.as_ref().unwrap();
        assert_eq!(user.username, "dev");
        assert_eq!(user.password, "devpass");
        assert!(config.validate().is_ok());

        let config = load(&[
            ("SLOWFALL_DEV_MODE", "1"),
            ("SLOWFALL_DEV_USERNAME", "carol"),
            ("SLOWFALL_DEV_PASSWORD", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.auth.dev_user.unwrap().username, "carol");
    }

    #[test]
    fn dev_user_ignored_outside_dev() {
        let config = load(&[("SLOWFALL_DEV_USERNAME", "carol")]).unwrap();
        assert!(config.auth.dev_user.is_none());
    }

    #[test]
    fn parses_lifetimes_and_limits() {
        let config = load(&[
            ("SLOWFALL_ACCESS_TOKEN_TTL_SECONDS", "600"),
            ("SLOWFALL_REFRESH_TOKEN_TTL_DAYS", "30"),
            ("SLOWFALL_CREDENTIALS_CACHE_TTL_SECONDS", "60"),
            ("SLOWFALL_MAX_BODY_BYTES", "2048"),
            ("SLOWFALL_REQUEST_TIMEOUT_SECONDS", "5"),
            ("SLOWFALL_CORS_ALLOWED_ORIGINS", "https://a.example.com, https://*.b.example.com,"),
        ])
        .unwrap();
        assert_eq!(config.auth.access_token_ttl, Duration::from_secs(600));
        assert_eq!(config.auth.refresh_token_ttl, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(config.auth.credentials_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.max_body_bytes, 2048);
        assert_eq!(config.request_timeout_seconds, 5);
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example.com", "https://*.b.example.com"]
        );
    }

    #[test]
    fn rejects_garbage_values() {
        assert!(matches!(
            load(&[("SLOWFALL_DEV_MODE", "maybe")]),
            Err(ConfigError::Invalid { var: "SLOWFALL_DEV_MODE", .. })
        ));
        assert!(matches!(
            load(&[("SLOWFALL_ACCESS_TOKEN_TTL_SECONDS", "-5")]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn refresh_lifetime_out_of_range_fails_validation() {
        let config = load(&[
            ("SLOWFALL_DEV_MODE", "true"),
            ("SLOWFALL_REFRESH_TOKEN_TTL_DAYS", "31"),
        ])
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Auth(AuthError::Config(_)))));
    }

    #[test]
    fn vault_names_require_url() {
        assert!(matches!(
            load(&[("AZURE_KEYVAULT_KEY_NAME", "signing")]),
            Err(ConfigError::Invalid { var: "AZURE_KEYVAULT_URL", .. })
        ));
        assert!(matches!(
            load(&[("AZURE_KEYVAULT_CREDENTIALS_SECRET", "creds")]),
            Err(ConfigError::Invalid { var: "AZURE_KEYVAULT_URL", .. })
        ));
    }

    #[test]
    fn vault_with_client_secret() {
        let config = load(&[
            ("AZURE_KEYVAULT_URL", "https://slowfall.vault.azure.net"),
            ("AZURE_KEYVAULT_KEY_NAME", "signing"),
            ("AZURE_TENANT_ID", "tenant"),
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CLIENT_SECRET", "secret"),
            ("SLOWFALL_ALLOWED_GROUP", "g1"),
        ])
        .unwrap();
        let kv = config.auth.key_vault.as_ref().unwrap();
        assert_eq!(kv.key_name.as_deref(), Some("signing"));
        assert!(matches!(
            &kv.credential,
            VaultCredential::ClientSecret { authority_host, .. }
                if authority_host == DEFAULT_AUTHORITY_HOST
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn vault_without_credentials_fails() {
        assert!(matches!(
            load(&[
                ("AZURE_KEYVAULT_URL", "https://slowfall.vault.azure.net"),
                ("AZURE_TENANT_ID", "tenant"),
            ]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn vault_url_must_be_http() {
        let config = load(&[
            ("AZURE_KEYVAULT_URL", "ftp://vault"),
            ("AZURE_KEYVAULT_TOKEN", "token"),
            ("SLOWFALL_DEV_MODE", "true"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bypass_prefix_shape() {
        let mut config = load(&[("SLOWFALL_DEV_MODE", "true")]).unwrap();
        config.dev_bypass_prefix = "api/dev".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { var: "SLOWFALL_DEV_BYPASS_PREFIX", .. })
        ));
    }
}
