//! Signing backends.
//!
//! Tokens are signed RS256 by exactly one backend, chosen at startup:
//!
//! - [`RemoteSigner`]: the private key lives in Key Vault; only the digest leaves the process
//! - [`LocalSigner`] from a PEM file: a stable key held in memory
//! - [`LocalSigner::generate`]: an ephemeral key, development only
//!
//! A configured remote key always wins over a local one.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::{Digest, Sha256};

use slowfall_core::KeyId;

use crate::error::{AuthError, Result, SigningError};
use crate::jwks::Jwk;
use crate::keyvault::KeyVaultClient;
use crate::AuthSettings;

/// Size of generated ephemeral keys.
pub const EPHEMERAL_KEY_BITS: usize = 2048;

/// Which kind of backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningBackend {
    /// Process-lifetime key generated at startup.
    Ephemeral,
    /// Local key loaded from a PEM file.
    LocalKey,
    /// Key Vault-backed remote key.
    KeyVault,
}

impl fmt::Display for SigningBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ephemeral => f.write_str("ephemeral"),
            Self::LocalKey => f.write_str("local_key"),
            Self::KeyVault => f.write_str("key_vault"),
        }
    }
}

/// Trait for producing RS256 signatures over a token's signing input.
#[async_trait]
pub trait TokenSigner: Send + Sync {
    /// Sign `signing_input` (`base64url(header) "." base64url(claims)`).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot produce a signature.
    async fn sign(&self, signing_input: &[u8]) -> std::result::Result<Vec<u8>, SigningError>;

    /// The ID of the active key, placed in the token header.
    fn key_id(&self) -> &KeyId;

    /// The public half of the active key.
    fn public_jwk(&self) -> &Jwk;

    /// The kind of backend.
    fn backend(&self) -> SigningBackend;

    /// Check that the backend can currently sign.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing, disabled or unreachable.
    async fn check(&self) -> std::result::Result<(), SigningError>;
}

/// Signs with an RSA private key held in memory.
pub struct LocalSigner {
    key: SigningKey<Sha256>,
    kid: KeyId,
    jwk: Jwk,
    backend: SigningBackend,
}

impl LocalSigner {
    /// Generate an ephemeral RSA-2048 key with a random key ID.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> std::result::Result<Self, SigningError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, EPHEMERAL_KEY_BITS)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self::from_private_key(
            private,
            KeyId::generate(),
            SigningBackend::Ephemeral,
        ))
    }

    /// Load a key from PKCS#8 or PKCS#1 PEM text.
    ///
    /// The key ID is derived from the public modulus, so it is stable across restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM cannot be parsed as an RSA private key.
    pub fn from_pem(pem: &str) -> std::result::Result<Self, SigningError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| SigningError::InvalidKey(format!("unreadable RSA private key: {e}")))?;
        let kid = derived_key_id(&RsaPublicKey::from(&private))?;
        Ok(Self::from_private_key(private, kid, SigningBackend::LocalKey))
    }

    /// Load a key from a PEM file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_pem_file(path: &Path) -> std::result::Result<Self, SigningError> {
        let pem = std::fs::read_to_string(path).map_err(|e| {
            SigningError::InvalidKey(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_pem(&pem)
    }

    /// Wrap an existing private key.
    #[must_use]
    pub fn from_private_key(private: RsaPrivateKey, kid: KeyId, backend: SigningBackend) -> Self {
        let jwk = Jwk::from_public_key(&kid, &RsaPublicKey::from(&private));
        Self {
            key: SigningKey::<Sha256>::new(private),
            kid,
            jwk,
            backend,
        }
    }
}

fn derived_key_id(public: &RsaPublicKey) -> std::result::Result<KeyId, SigningError> {
    let digest = blake3::hash(&public.n().to_bytes_be());
    KeyId::new(hex::encode(&digest.as_bytes()[..16]))
        .map_err(|e| SigningError::InvalidKey(e.to_string()))
}

#[async_trait]
impl TokenSigner for LocalSigner {
    async fn sign(&self, signing_input: &[u8]) -> std::result::Result<Vec<u8>, SigningError> {
        self.key
            .try_sign(signing_input)
            .map(|signature| signature.to_vec())
            .map_err(|e| SigningError::InvalidKey(e.to_string()))
    }

    fn key_id(&self) -> &KeyId {
        &self.kid
    }

    fn public_jwk(&self) -> &Jwk {
        &self.jwk
    }

    fn backend(&self) -> SigningBackend {
        self.backend
    }

    async fn check(&self) -> std::result::Result<(), SigningError> {
        Ok(())
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("kid", &self.kid)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

/// Delegates signing to a Key Vault key.
///
/// The SHA-256 digest is computed locally and sent to the vault. One call per
/// signature, no retry.
pub struct RemoteSigner {
    client: Arc<KeyVaultClient>,
    key_name: String,
    version: String,
    kid: KeyId,
    jwk: Jwk,
}

impl RemoteSigner {
    /// Resolve the named key and build a signer for its current version.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be fetched, is disabled, or has no version.
    pub async fn connect(
        client: Arc<KeyVaultClient>,
        key_name: &str,
    ) -> std::result::Result<Self, SigningError> {
        let key = client.get_key(key_name).await?;
        if !key.enabled {
            return Err(SigningError::KeyDisabled(key_name.to_string()));
        }
        let version = key
            .version()
            .ok_or_else(|| SigningError::Remote(format!("key {key_name} has no version")))?
            .to_string();

        tracing::info!(key = key_name, kid = %key.kid, "Resolved Key Vault signing key");

        Ok(Self {
            jwk: key.jwk(),
            kid: key.kid,
            client,
            key_name: key_name.to_string(),
            version,
        })
    }
}

#[async_trait]
impl TokenSigner for RemoteSigner {
    async fn sign(&self, signing_input: &[u8]) -> std::result::Result<Vec<u8>, SigningError> {
        let digest = Sha256::digest(signing_input);
        self.client
            .sign_digest(&self.key_name, &self.version, &digest)
            .await
            .map_err(|e| {
                tracing::warn!(key = %self.key_name, error = %e, "Remote signing failed");
                SigningError::from(e)
            })
    }

    fn key_id(&self) -> &KeyId {
        &self.kid
    }

    fn public_jwk(&self) -> &Jwk {
        &self.jwk
    }

    fn backend(&self) -> SigningBackend {
        SigningBackend::KeyVault
    }

    async fn check(&self) -> std::result::Result<(), SigningError> {
        let key = self.client.get_key(&self.key_name).await?;
        if key.enabled {
            Ok(())
        } else {
            Err(SigningError::KeyDisabled(self.key_name.clone()))
        }
    }
}

impl fmt::Debug for RemoteSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSigner")
            .field("key_name", &self.key_name)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Select and construct the signing backend for these settings.
///
/// Precedence: Key Vault key, then PEM file, then (development only) an ephemeral key.
///
/// # Errors
///
/// Returns an error if the chosen backend cannot be constructed, or if no key is
/// configured outside development.
pub async fn select_signer(
    settings: &AuthSettings,
    vault: Option<Arc<KeyVaultClient>>,
) -> Result<Arc<dyn TokenSigner>> {
    let key_name = settings
        .key_vault
        .as_ref()
        .and_then(|kv| kv.key_name.as_deref());

    if let Some(key_name) = key_name {
        let client = vault.ok_or_else(|| {
            AuthError::Config("Key Vault key configured without a vault client".to_string())
        })?;
        if settings.signing_key_pem.is_some() {
            tracing::warn!("Both a Key Vault key and a local PEM key are configured; using Key Vault");
        }
        let signer = RemoteSigner::connect(client, key_name).await?;
        return Ok(Arc::new(signer));
    }

    if let Some(path) = &settings.signing_key_pem {
        let signer = LocalSigner::from_pem_file(path)?;
        tracing::info!(kid = %signer.key_id(), path = %path.display(), "Loaded local signing key");
        return Ok(Arc::new(signer));
    }

    if settings.dev_mode {
        let signer = LocalSigner::generate()?;
        tracing::warn!(kid = %signer.key_id(), "Using ephemeral signing key (development only)");
        return Ok(Arc::new(signer));
    }

    Err(AuthError::Config(
        "no signing key configured: set AZURE_KEYVAULT_KEY_NAME or SLOWFALL_SIGNING_KEY_PEM"
            .to_string(),
    ))
}

/// A signer for tests, sharing one generated key across the test binary.
#[cfg(any(test, feature = "test-utils"))]
pub fn test_signer() -> LocalSigner {
    use std::sync::OnceLock;

    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    let private = KEY
        .get_or_init(|| {
            RsaPrivateKey::new(&mut rand::thread_rng(), EPHEMERAL_KEY_BITS)
                .expect("test key generation")
        })
        .clone();
    LocalSigner::from_private_key(
        private,
        KeyId::new("test-key").expect("static kid"),
        SigningBackend::Ephemeral,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvault::VaultCredential;
    use base64::prelude::*;
    use jsonwebtoken::Algorithm;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn local_signature_verifies_with_published_jwk() {
        let signer = test_signer();
        let message = b"eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJhbGljZSJ9";
        let signature = signer.sign(message).await.unwrap();
        assert_eq!(signature.len(), 256);

        let key = signer.public_jwk().decoding_key().unwrap().unwrap();
        let encoded = BASE64_URL_SAFE_NO_PAD.encode(&signature);
        assert!(jsonwebtoken::crypto::verify(&encoded, message, &key, Algorithm::RS256).unwrap());
    }

    #[tokio::test]
    async fn pem_key_has_stable_kid() {
        let pem = test_signer_pem();
        let a = LocalSigner::from_pem(&pem).unwrap();
        let b = LocalSigner::from_pem(&pem).unwrap();
        assert_eq!(a.key_id(), b.key_id());
        assert_eq!(a.backend(), SigningBackend::LocalKey);
        assert!(a.check().await.is_ok());
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let err = LocalSigner::from_pem("not a key").unwrap_err();
        assert!(matches!(err, SigningError::InvalidKey(_)));
    }

    fn test_signer_pem() -> String {
        use std::sync::OnceLock;
        static PEM: OnceLock<String> = OnceLock::new();
        PEM.get_or_init(|| {
            let private = RsaPrivateKey::new(&mut rand::thread_rng(), EPHEMERAL_KEY_BITS).unwrap();
            private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
        })
        .clone()
    }

    #[tokio::test]
    async fn ephemeral_only_in_dev_mode() {
        let settings = AuthSettings {
            dev_mode: false,
            ..AuthSettings::default()
        };
        assert!(matches!(
            select_signer(&settings, None).await,
            Err(AuthError::Config(_))
        ));
    }

    #[tokio::test]
    async fn pem_file_is_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.pem");
        std::fs::write(&path, test_signer_pem()).unwrap();

        let settings = AuthSettings {
            signing_key_pem: Some(path),
            ..AuthSettings::default()
        };
        let signer = select_signer(&settings, None).await.unwrap();
        assert_eq!(signer.backend(), SigningBackend::LocalKey);
    }

    async fn vault_with_key(enabled: bool) -> (MockServer, Arc<KeyVaultClient>) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keys/signing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key": {
                    "kid": format!("{}/keys/signing/v1", server.uri()),
                    "kty": "RSA",
                    "n": "u1SU1LfVLPHCozMx",
                    "e": "AQAB"
                },
                "attributes": { "enabled": enabled }
            })))
            .mount(&server)
            .await;
        let client = KeyVaultClient::new(&server.uri(), VaultCredential::StaticToken("t".into()))
            .unwrap();
        (server, Arc::new(client))
    }

    fn remote_settings() -> AuthSettings {
        AuthSettings {
            key_vault: Some(crate::KeyVaultSettings {
                vault_url: "http://unused".into(),
                key_name: Some("signing".into()),
                credentials_secret: None,
                credential: VaultCredential::StaticToken("t".into()),
            }),
            ..AuthSettings::default()
        }
    }

    #[tokio::test]
    async fn remote_wins_over_local_pem() {
        let (_server, client) = vault_with_key(true).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.pem");
        std::fs::write(&path, test_signer_pem()).unwrap();

        let settings = AuthSettings {
            signing_key_pem: Some(path),
            ..remote_settings()
        };
        let signer = select_signer(&settings, Some(client)).await.unwrap();
        assert_eq!(signer.backend(), SigningBackend::KeyVault);
        assert!(signer.key_id().as_str().ends_with("/keys/signing/v1"));
    }

    #[tokio::test]
    async fn disabled_remote_key_fails_startup() {
        let (_server, client) = vault_with_key(false).await;
        let err = select_signer(&remote_settings(), Some(client))
            .await
            .err().expect("expected startup error");
        assert!(matches!(
            err,
            AuthError::Signing(SigningError::KeyDisabled(_))
        ));
    }

    #[tokio::test]
    async fn missing_remote_key_fails_startup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keys/signing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let client = Arc::new(
            KeyVaultClient::new(&server.uri(), VaultCredential::StaticToken("t".into())).unwrap(),
        );

        let err = select_signer(&remote_settings(), Some(client))
            .await
            .err().expect("expected startup error");
        assert!(matches!(
            err,
            AuthError::Signing(SigningError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn remote_sign_sends_sha256_digest() {
        let (server, client) = vault_with_key(true).await;
        let input = b"header.claims";
        let digest = Sha256::digest(input);
        Mock::given(method("POST"))
            .and(path("/keys/signing/v1/sign"))
            .and(wiremock::matchers::body_json(json!({
                "alg": "RS256",
                "value": BASE64_URL_SAFE_NO_PAD.encode(digest)
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kid": "k",
                "value": "AQID"
            })))
            .mount(&server)
            .await;

        let signer = RemoteSigner::connect(client, "signing").await.unwrap();
        assert_eq!(signer.sign(input).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn remote_permission_denied_maps_to_signing_error() {
        let (server, client) = vault_with_key(true).await;
        Mock::given(method("POST"))
            .and(path("/keys/signing/v1/sign"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let signer = RemoteSigner::connect(client, "signing").await.unwrap();
        assert_eq!(
            signer.sign(b"x").await.unwrap_err(),
            SigningError::PermissionDenied
        );
    }
}
