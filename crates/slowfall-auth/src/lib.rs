//! Token authentication and authorization for slowfall.
//!
//! This crate issues and verifies RS256 access/refresh tokens and decides
//! whether a request may proceed:
//!
//! - Signing through a local RSA key or a Key Vault key ([`TokenSigner`])
//! - A TTL-cached single-user credential held in a vault secret ([`CredentialCache`])
//! - Token issuance and refresh ([`TokenIssuer`]) and verification ([`TokenVerifier`])
//! - Group-based authorization ([`AuthorizationPolicy`])
//!
//! # Architecture
//!
//! ```text
//!  login ──▶ Authenticator ──▶ TokenIssuer ──▶ TokenSigner ──┬─▶ LocalSigner (rsa)
//!              │                    ▲                         └─▶ RemoteSigner ──▶ Key Vault
//!              ▼                    │
//!        CredentialCache      TokenVerifier ◀── bearer token
//!              │                    │
//!              ▼                    ▼
//!         Key Vault secret    AuthorizationPolicy ──▶ Permit / 401 / 403
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use slowfall_auth::{
//!     select_signer, AuthSettings, InMemoryDirectory, Principal, TokenIssuer, TokenType,
//!     TokenVerifier,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = AuthSettings { dev_mode: true, ..AuthSettings::default() };
//! let signer = select_signer(&settings, None).await?;
//! let verifier = Arc::new(TokenVerifier::for_signer(signer.as_ref())?);
//! let issuer = TokenIssuer::new(
//!     signer,
//!     Arc::clone(&verifier),
//!     Arc::new(InMemoryDirectory::new()),
//!     &settings,
//! );
//!
//! let principal = Principal {
//!     subject: slowfall_core::Subject::new("alice")?,
//!     roles: vec!["ROLE_USER".to_string()],
//!     groups: vec![settings.effective_allowed_group()?],
//! };
//! let pair = issuer.issue_pair(&principal).await?;
//! let claims = verifier.verify(&pair.access.token, TokenType::Access)?;
//! println!("Subject: {}", claims.subject());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use slowfall_core::GroupId;

pub mod claims;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod issuer;
pub mod jwks;
pub mod keyvault;
pub mod policy;
pub mod signing;
pub mod verifier;

pub use claims::{ClaimSet, IssuedToken, TokenType};
pub use credentials::{CredentialCache, SecretSource, StoredCredential, VaultSecret};
pub use directory::{hash_password, Authenticator, InMemoryDirectory, Principal, UserDirectory};
pub use error::{AuthError, Result, SigningError};
pub use issuer::{TokenIssuer, TokenPair};
pub use jwks::{Jwk, JwkSet};
pub use keyvault::{KeyVaultClient, VaultCredential, VaultError};
pub use policy::{AuthorizationPolicy, Decision, Identity, IdentityOrigin};
pub use signing::{select_signer, LocalSigner, RemoteSigner, SigningBackend, TokenSigner};
pub use verifier::TokenVerifier;

#[cfg(any(test, feature = "test-utils"))]
pub use signing::test_signer;

/// Group used in development when none is configured.
pub const DEV_FALLBACK_GROUP: &str = "1dea5e51-d15e-4081-9722-46da3bfdee79";

/// Default `iss` claim.
pub const DEFAULT_ISSUER: &str = "slowfall";

/// Default access-token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Shortest allowed refresh-token lifetime, also the default (7 days).
pub const MIN_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Longest allowed refresh-token lifetime (30 days).
pub const MAX_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Key Vault connection settings.
#[derive(Debug, Clone)]
pub struct KeyVaultSettings {
    /// Vault base URL (e.g., `https://slowfall.vault.azure.net`).
    pub vault_url: String,
    /// Name of the signing key, if tokens are signed remotely.
    pub key_name: Option<String>,
    /// Name of the secret holding the production credential.
    pub credentials_secret: Option<String>,
    /// How to authenticate to the vault.
    pub credential: VaultCredential,
}

/// The development login user.
#[derive(Clone)]
pub struct DevUser {
    /// Username.
    pub username: String,
    /// Plain-text password, hashed at startup.
    pub password: String,
}

impl fmt::Debug for DevUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for token issuance, verification and authorization.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// `iss` claim for issued tokens.
    pub issuer: String,
    /// Access-token lifetime.
    pub access_token_ttl: Duration,
    /// Refresh-token lifetime, 7 to 30 days.
    pub refresh_token_ttl: Duration,
    /// Group whose members may call protected paths.
    pub allowed_group: Option<GroupId>,
    /// Development mode: ephemeral keys, dev user, dev bypass.
    pub dev_mode: bool,
    /// Local RSA private key (PEM).
    pub signing_key_pem: Option<PathBuf>,
    /// Key Vault settings.
    pub key_vault: Option<KeyVaultSettings>,
    /// How long a fetched credential secret stays valid.
    pub credentials_cache_ttl: Duration,
    /// Directory user available in development.
    pub dev_user: Option<DevUser>,
}

impl AuthSettings {
    /// The allowed group, falling back to [`DEV_FALLBACK_GROUP`] in development.
    ///
    /// # Errors
    ///
    /// Returns `MisconfiguredAuthority` if no group is configured outside development.
    pub fn effective_allowed_group(&self) -> Result<GroupId> {
        if let Some(group) = &self.allowed_group {
            return Ok(group.clone());
        }
        if self.dev_mode {
            return GroupId::new(DEV_FALLBACK_GROUP)
                .map_err(|e| AuthError::Internal(format!("invalid fallback group: {e}")));
        }
        Err(AuthError::MisconfiguredAuthority(
            "SLOWFALL_ALLOWED_GROUP is required outside development".to_string(),
        ))
    }

    /// Check the settings for startup-fatal problems.
    ///
    /// # Errors
    ///
    /// Returns `Config` or `MisconfiguredAuthority` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.issuer.trim().is_empty() {
            return Err(AuthError::Config("issuer must not be empty".to_string()));
        }
        if self.access_token_ttl.is_zero() {
            return Err(AuthError::Config(
                "access token lifetime must be positive".to_string(),
            ));
        }
        if self.refresh_token_ttl < MIN_REFRESH_TOKEN_TTL
            || self.refresh_token_ttl > MAX_REFRESH_TOKEN_TTL
        {
            return Err(AuthError::Config(format!(
                "refresh token lifetime must be 7 to 30 days, got {}s",
                self.refresh_token_ttl.as_secs()
            )));
        }
        if let Some(kv) = &self.key_vault {
            if !(kv.vault_url.starts_with("https://") || kv.vault_url.starts_with("http://")) {
                return Err(AuthError::Config(format!(
                    "vault URL must start with http:// or https://: {}",
                    kv.vault_url
                )));
            }
        }

        self.effective_allowed_group()?;

        let remote_key = self
            .key_vault
            .as_ref()
            .is_some_and(|kv| kv.key_name.is_some());
        if !self.dev_mode && !remote_key && self.signing_key_pem.is_none() {
            return Err(AuthError::Config(
                "no signing key configured: set AZURE_KEYVAULT_KEY_NAME or SLOWFALL_SIGNING_KEY_PEM"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: MIN_REFRESH_TOKEN_TTL,
            allowed_group: None,
            dev_mode: false,
            signing_key_pem: None,
            key_vault: None,
            credentials_cache_ttl: credentials::DEFAULT_CACHE_TTL,
            dev_user: None,
        }
    }
}
