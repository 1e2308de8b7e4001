//! JWKS (JSON Web Key Set) documents.
//!
//! The active signing key's public half is published as a single-key JWKS so
//! that downstream services can verify tokens without sharing secrets.

use base64::prelude::*;
use jsonwebtoken::DecodingKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

use slowfall_core::KeyId;

use crate::error::{AuthError, Result};

/// A JWKS document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// The list of keys.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// A set containing exactly one key.
    #[must_use]
    pub fn single(key: Jwk) -> Self {
        Self { keys: vec![key] }
    }

    /// Find a key by its ID.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// A single RSA JWK (JSON Web Key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (always "RSA" for keys we publish).
    pub kty: String,
    /// Modulus (base64url, unpadded).
    pub n: String,
    /// Public exponent (base64url, unpadded).
    pub e: String,
    /// Key ID.
    pub kid: String,
    /// Algorithm (`RS256`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Key use ("sig").
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
}

impl Jwk {
    /// Build an RS256 signing JWK from base64url modulus and exponent.
    #[must_use]
    pub fn rs256(kid: &KeyId, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kty: "RSA".to_string(),
            n: n.into(),
            e: e.into(),
            kid: kid.as_str().to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
        }
    }

    /// Build the JWK for a local RSA public key.
    #[must_use]
    pub fn from_public_key(kid: &KeyId, key: &RsaPublicKey) -> Self {
        Self::rs256(
            kid,
            BASE64_URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            BASE64_URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        )
    }

    /// Parse this JWK into a `DecodingKey` for signature verification.
    ///
    /// Returns `Ok(None)` for key types other than RSA.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSA components are not valid base64url.
    pub fn decoding_key(&self) -> Result<Option<DecodingKey>> {
        match self.kty.as_str() {
            "RSA" => {
                if let Some(alg) = self.alg.as_deref() {
                    if alg != "RS256" {
                        tracing::warn!(alg, kid = %self.kid, "Unsupported RSA algorithm");
                        return Ok(None);
                    }
                }
                DecodingKey::from_rsa_components(&self.n, &self.e)
                    .map(Some)
                    .map_err(|e| AuthError::Config(format!("invalid RSA components: {e}")))
            }
            other => {
                tracing::warn!(kty = other, "Unknown key type");
                Ok(None)
            }
        }
    }
}
