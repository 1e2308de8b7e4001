//! Gateway shared state.
//!
//! Everything here is built once at startup and shared read-only across
//! requests behind an `Arc`.

use std::sync::Arc;

use slowfall_auth::directory::DEFAULT_ROLE;
use slowfall_auth::{
    hash_password, select_signer, Authenticator, AuthorizationPolicy, CredentialCache,
    InMemoryDirectory, KeyVaultClient, TokenIssuer, TokenSigner, TokenVerifier, UserDirectory,
    VaultSecret,
};

use crate::bypass::DevBypassGate;
use crate::config::{ConfigError, GatewayConfig};
use crate::cors::CorsNegotiator;
use crate::handlers::health::HealthCache;

/// bcrypt cost for the development user hashed at startup.
const DEV_USER_HASH_COST: u32 = 10;

/// Shared state for the gateway.
pub struct GatewayState {
    /// Issues and refreshes tokens.
    pub issuer: Arc<TokenIssuer>,
    /// Verifies bearer tokens.
    pub verifier: Arc<TokenVerifier>,
    /// Checks login credentials.
    pub authenticator: Arc<Authenticator>,
    /// Decides access to protected paths.
    pub policy: Arc<AuthorizationPolicy>,
    /// Development bypass.
    pub bypass: Arc<DevBypassGate>,
    /// CORS allow-list.
    pub cors: Arc<CorsNegotiator>,
    /// Recent backend health checks.
    pub health: HealthCache,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl GatewayState {
    /// Wire the gateway from already-built components.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration lacks an allowed group outside
    /// development, or if the signer's key cannot verify tokens.
    pub fn new(
        config: GatewayConfig,
        signer: Arc<dyn TokenSigner>,
        credentials: Option<Arc<CredentialCache>>,
        directory: Arc<dyn UserDirectory>,
    ) -> Result<Self, ConfigError> {
        let policy = AuthorizationPolicy::from_settings(&config.auth)?;
        let verifier = Arc::new(TokenVerifier::for_signer(signer.as_ref())?);
        let issuer = TokenIssuer::new(
            signer,
            Arc::clone(&verifier),
            Arc::clone(&directory),
            &config.auth,
        );
        let authenticator = Authenticator::new(
            credentials,
            directory,
            vec![policy.allowed_group().clone()],
        );
        let bypass = DevBypassGate::new(
            config.auth.dev_mode,
            config.dev_bypass_prefix.clone(),
            policy.allowed_group().clone(),
        )?;
        let cors = CorsNegotiator::new(&config.cors_origins);

        Ok(Self {
            issuer: Arc::new(issuer),
            verifier,
            authenticator: Arc::new(authenticator),
            policy: Arc::new(policy),
            bypass: Arc::new(bypass),
            cors: Arc::new(cors),
            health: HealthCache::default(),
            config,
        })
    }

    /// Build every component from configuration.
    ///
    /// Connects to Key Vault when configured, selects the signing backend,
    /// and hashes the development user.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or a backend cannot be reached.
    pub async fn from_config(config: GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let settings = &config.auth;

        let vault = match &settings.key_vault {
            Some(kv) => {
                let client = KeyVaultClient::new(&kv.vault_url, kv.credential.clone())?;
                tracing::info!(vault_url = %kv.vault_url, "Key Vault client initialized");
                Some(Arc::new(client))
            }
            None => None,
        };

        let signer = select_signer(settings, vault.clone()).await?;
        tracing::info!(
            backend = %signer.backend(),
            kid = %signer.key_id(),
            "Signing backend selected"
        );

        let credentials = match (
            &vault,
            settings
                .key_vault
                .as_ref()
                .and_then(|kv| kv.credentials_secret.as_deref()),
        ) {
            (Some(client), Some(secret)) => {
                tracing::info!(secret = %secret, "Credential cache enabled");
                let source = VaultSecret::new(Arc::clone(client), secret);
                Some(Arc::new(CredentialCache::new(
                    Arc::new(source),
                    settings.credentials_cache_ttl,
                )))
            }
            _ => None,
        };

        let mut directory = InMemoryDirectory::new();
        if let Some(user) = &settings.dev_user {
            let hash = hash_password(&user.password, DEV_USER_HASH_COST)?;
            directory = directory.with_user(&user.username, hash, vec![DEFAULT_ROLE.to_string()]);
            tracing::warn!(username = %user.username, "Development user enabled");
        }

        Self::new(config, signer, credentials, Arc::new(directory))
    }

    /// The active signing backend.
    #[must_use]
    pub fn signer(&self) -> &Arc<dyn TokenSigner> {
        self.issuer.signer()
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("backend", &self.signer().backend())
            .field("policy", &self.policy)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
