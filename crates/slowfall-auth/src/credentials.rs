//! Cached single-user credential.
//!
//! Production deployments keep one username/password-hash pair in a vault
//! secret. The secret is fetched lazily and cached for a TTL. Readers take a
//! snapshot under a short read lock and never wait on the network; refreshes
//! are single-flight, so a burst of stale readers triggers exactly one fetch.
//!
//! Every failure (fetch, parse, mismatch) is reported as `false`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tokio::time::Instant;

use crate::keyvault::{KeyVaultClient, VaultError};

/// Default time a fetched credential stays valid.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// A source of the raw credential document.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch the current secret value.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be read.
    async fn fetch(&self) -> Result<String, VaultError>;
}

/// A named Key Vault secret.
pub struct VaultSecret {
    client: Arc<KeyVaultClient>,
    name: String,
}

impl VaultSecret {
    /// Read the secret `name` through `client`.
    #[must_use]
    pub fn new(client: Arc<KeyVaultClient>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }
}

#[async_trait]
impl SecretSource for VaultSecret {
    async fn fetch(&self) -> Result<String, VaultError> {
        self.client.get_secret(&self.name).await
    }
}

/// A parsed username/password-hash pair.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct StoredCredential {
    username: String,
    #[serde(alias = "password_hash", rename = "passwordHash")]
    password_hash: String,
}

impl StoredCredential {
    /// Parse a credential document.
    ///
    /// Accepts JSON `{"username": "...", "passwordHash": "..."}` (or `password_hash`)
    /// and the delimited form `username:hash`. Returns `None` if either field is
    /// missing or empty.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let parsed = if raw.starts_with('{') {
            serde_json::from_str::<Self>(raw).ok()?
        } else {
            let (username, hash) = raw.split_once(':')?;
            Self {
                username: username.trim().to_string(),
                password_hash: hash.trim().to_string(),
            }
        };

        if parsed.username.is_empty() || parsed.password_hash.is_empty() {
            return None;
        }
        Some(parsed)
    }

    /// The expected username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("username", &slowfall_core::redact::mask(&self.username))
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

#[derive(Default)]
struct Snapshot {
    /// `None` when the last fetched document did not parse.
    credential: Option<Arc<StoredCredential>>,
    fetched_at: Option<Instant>,
}

/// TTL-bound cache of a single remotely-stored credential.
pub struct CredentialCache {
    source: Arc<dyn SecretSource>,
    ttl: Duration,
    snapshot: RwLock<Snapshot>,
    refresh: tokio::sync::Mutex<()>,
}

impl CredentialCache {
    /// Create an empty cache; the first validation fetches the secret.
    #[must_use]
    pub fn new(source: Arc<dyn SecretSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            snapshot: RwLock::new(Snapshot::default()),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Check `username`/`password` against the cached credential.
    ///
    /// Refreshes the credential first if it is stale. Fails closed.
    pub async fn validate(&self, username: &str, password: &str) -> bool {
        let Some(credential) = self.current().await else {
            return false;
        };

        let username_matches: bool = credential
            .username
            .as_bytes()
            .ct_eq(username.as_bytes())
            .into();

        // Verify the hash even when the username differs.
        let hash = credential.password_hash.clone();
        let password = password.to_owned();
        let password_matches =
            tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
                .await
                .unwrap_or(false);

        username_matches && password_matches
    }

    /// Returns `true` if a usable credential is available.
    ///
    /// Served from the cache within the TTL; otherwise fetches the secret.
    pub async fn check(&self) -> bool {
        self.current().await.is_some()
    }

    /// Returns the cached credential, refreshing it if stale.
    async fn current(&self) -> Option<Arc<StoredCredential>> {
        if let Some(fresh) = self.fresh() {
            return fresh;
        }

        let _guard = self.refresh.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(fresh) = self.fresh() {
            return fresh;
        }

        match self.source.fetch().await {
            Ok(raw) => {
                let credential = StoredCredential::parse(&raw).map(Arc::new);
                if credential.is_none() {
                    tracing::warn!("Credential secret could not be parsed");
                } else {
                    tracing::debug!(ttl_secs = self.ttl.as_secs(), "Refreshed cached credential");
                }
                let mut snapshot = self.snapshot.write();
                snapshot.credential.clone_from(&credential);
                snapshot.fetched_at = Some(Instant::now());
                credential
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch credential secret");
                None
            }
        }
    }

    /// `Some(snapshot)` if a fetch happened within the TTL.
    #[allow(clippy::option_option)]
    fn fresh(&self) -> Option<Option<Arc<StoredCredential>>> {
        let snapshot = self.snapshot.read();
        let fetched_at = snapshot.fetched_at?;
        (fetched_at.elapsed() <= self.ttl).then(|| snapshot.credential.clone())
    }
}
