//! Azure Key Vault REST client.
//!
//! Covers the three operations slowfall needs: reading key metadata (public
//! half plus `enabled`), remote RS256 signing of a precomputed digest, and
//! reading a secret value. Requests carry a bearer token obtained with the
//! OAuth2 client-credentials grant, or a pre-issued token.

use std::fmt;
use std::time::{Duration, Instant};

use base64::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use slowfall_core::KeyId;

use crate::jwks::Jwk;

/// Key Vault REST API version.
pub const API_VERSION: &str = "7.4";

/// OAuth2 scope for Key Vault data-plane access.
pub const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// Default Microsoft identity platform authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Tokens are treated as expired this long before their real expiry.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Errors returned by the Key Vault client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The key or secret does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The key exists but is disabled.
    #[error("disabled: {0}")]
    Disabled(String),

    /// The caller is not allowed to perform the operation.
    #[error("permission denied")]
    PermissionDenied,

    /// The vault or the token endpoint could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// A vault access token could not be obtained.
    #[error("credential error: {0}")]
    Credential(String),

    /// Any other failure reported by the vault.
    #[error("remote error: {0}")]
    Remote(String),
}

/// How the client authenticates to the vault.
#[derive(Clone)]
pub enum VaultCredential {
    /// OAuth2 client-credentials grant against the Microsoft identity platform.
    ClientSecret {
        /// Authority host, normally [`DEFAULT_AUTHORITY_HOST`].
        authority_host: String,
        /// Directory (tenant) ID.
        tenant_id: String,
        /// Application (client) ID.
        client_id: String,
        /// Client secret.
        client_secret: String,
    },
    /// A pre-issued bearer token.
    StaticToken(String),
}

impl fmt::Debug for VaultCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("authority_host", authority_host)
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Self::StaticToken(_) => f.write_str("StaticToken(<redacted>)"),
        }
    }
}

/// Public metadata of a vault key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVaultKey {
    /// Full key identifier (`https://{vault}/keys/{name}/{version}`).
    pub kid: KeyId,
    /// RSA modulus, base64url.
    pub n: String,
    /// RSA exponent, base64url.
    pub e: String,
    /// Whether the key may be used.
    pub enabled: bool,
}

impl KeyVaultKey {
    /// The key version, taken from the last segment of the key identifier.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.kid
            .as_str()
            .rsplit('/')
            .next()
            .filter(|v| !v.is_empty())
    }

    /// The published JWK for this key.
    #[must_use]
    pub fn jwk(&self) -> Jwk {
        Jwk::rs256(&self.kid, self.n.clone(), self.e.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RawKeyBundle {
    key: RawJsonWebKey,
    #[serde(default)]
    attributes: RawAttributes,
}

#[derive(Debug, Deserialize)]
struct RawJsonWebKey {
    kid: String,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAttributes {
    #[serde(default = "default_enabled")]
    enabled: bool,
}

impl Default for RawAttributes {
    fn default() -> Self {
        Self { enabled: true }
    }
}

const fn default_enabled() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    alg: &'a str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Error body returned by the vault.
#[derive(Debug, Deserialize)]
struct VaultErrorResponse {
    error: VaultErrorBody,
}

#[derive(Debug, Deserialize)]
struct VaultErrorBody {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Client for the Key Vault REST API.
pub struct KeyVaultClient {
    vault_url: String,
    client: reqwest::Client,
    credential: VaultCredential,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

impl KeyVaultClient {
    /// Create a new client for the vault at `vault_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s) or the HTTP client cannot be built.
    pub fn new(vault_url: &str, credential: VaultCredential) -> Result<Self, VaultError> {
        let vault_url = vault_url.trim().trim_end_matches('/').to_string();
        if !(vault_url.starts_with("https://") || vault_url.starts_with("http://")) {
            return Err(VaultError::Remote(format!(
                "vault URL must start with http:// or https://: {vault_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| VaultError::Remote(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            vault_url,
            client,
            credential,
            token: tokio::sync::Mutex::new(None),
        })
    }

    /// The vault base URL.
    #[must_use]
    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    /// Fetch the current version of a key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing key, `PermissionDenied` on 401/403,
    /// `Unreachable` on transport failure.
    pub async fn get_key(&self, name: &str) -> Result<KeyVaultKey, VaultError> {
        let url = format!("{}/keys/{name}", self.vault_url);
        tracing::debug!(key = name, "Fetching Key Vault key");

        let token = self.bearer().await?;
        let response = self
            .client
            .get(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VaultError::Unreachable(e.to_string()))?;

        let raw: RawKeyBundle = Self::handle_response(response, name).await?;
        if raw.key.kty != "RSA" && raw.key.kty != "RSA-HSM" {
            return Err(VaultError::Remote(format!(
                "unsupported key type {} for {name}",
                raw.key.kty
            )));
        }

        let (Some(n), Some(e)) = (raw.key.n, raw.key.e) else {
            return Err(VaultError::Remote(format!("key {name} has no public components")));
        };
        let kid = KeyId::new(raw.key.kid)
            .map_err(|e| VaultError::Remote(format!("invalid kid for {name}: {e}")))?;

        Ok(KeyVaultKey {
            kid,
            n,
            e,
            enabled: raw.attributes.enabled,
        })
    }

    /// Sign a SHA-256 digest with RS256 using the given key version.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault rejects the operation or cannot be reached.
    pub async fn sign_digest(
        &self,
        name: &str,
        version: &str,
        digest: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        let url = format!("{}/keys/{name}/{version}/sign", self.vault_url);
        let body = SignRequest {
            alg: "RS256",
            value: BASE64_URL_SAFE_NO_PAD.encode(digest),
        };

        let token = self.bearer().await?;
        let response = self
            .client
            .post(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| VaultError::Unreachable(e.to_string()))?;

        let signed: SignResponse = Self::handle_response(response, name).await?;
        BASE64_URL_SAFE_NO_PAD
            .decode(signed.value.trim_end_matches('='))
            .map_err(|e| VaultError::Remote(format!("invalid signature encoding: {e}")))
    }

    /// Read the current value of a secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is missing, access is denied, or the vault
    /// cannot be reached.
    pub async fn get_secret(&self, name: &str) -> Result<String, VaultError> {
        let url = format!("{}/secrets/{name}", self.vault_url);
        tracing::debug!(secret = name, "Fetching Key Vault secret");

        let token = self.bearer().await?;
        let response = self
            .client
            .get(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VaultError::Unreachable(e.to_string()))?;

        let secret: SecretBundle = Self::handle_response(response, name).await?;
        Ok(secret.value)
    }

    /// Return a valid bearer token, acquiring a new one if needed.
    async fn bearer(&self) -> Result<String, VaultError> {
        let (authority_host, tenant_id, client_id, client_secret) = match &self.credential {
            VaultCredential::StaticToken(token) => return Ok(token.clone()),
            VaultCredential::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                client_secret,
            } => (authority_host, tenant_id, client_id, client_secret),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/{tenant_id}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/')
        );
        tracing::debug!(tenant_id = %tenant_id, client_id = %client_id, "Acquiring Key Vault access token");

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", VAULT_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| VaultError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::Credential(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| VaultError::Credential(format!("invalid token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_SKEW);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    /// Handle a vault response, mapping failures to `VaultError`.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
        name: &str,
    ) -> Result<T, VaultError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| VaultError::Remote(format!("invalid response: {e}")));
        }

        let error_response: Option<VaultErrorResponse> = response.json().await.ok();
        let (code, message) = error_response
            .map(|r| (r.error.code, r.error.message.unwrap_or_default()))
            .unwrap_or_default();

        tracing::warn!(
            status = status.as_u16(),
            code = %code,
            target = name,
            "Key Vault request failed"
        );

        if code == "KeyDisabled" || message.to_ascii_lowercase().contains("disabled") {
            return Err(VaultError::Disabled(name.to_string()));
        }

        match status.as_u16() {
            404 => Err(VaultError::NotFound(name.to_string())),
            401 | 403 => Err(VaultError::PermissionDenied),
            _ if code.is_empty() => Err(VaultError::Remote(format!("HTTP {status}"))),
            _ => Err(VaultError::Remote(format!("HTTP {status}: {code}"))),
        }
    }
}

impl fmt::Debug for KeyVaultClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVaultClient")
            .field("vault_url", &self.vault_url)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}
