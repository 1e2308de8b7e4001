//! Token verification.
//!
//! Checks run in a fixed order and each failure maps to one error kind, so
//! callers can tell an expired token from a forged one:
//!
//! 1. three segments, decodable header (`MalformedToken`)
//! 2. `alg` is RS256 and `kid` is the active key (`BadSignature`)
//! 3. signature over `header.claims` (`BadSignature`)
//! 4. decodable claims with `iat <= exp` (`MalformedToken`)
//! 5. `now <= exp` (`TokenExpired`)
//! 6. expected `type` (`WrongTokenType`)

use base64::prelude::*;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey};

use slowfall_core::redact::fingerprint;
use slowfall_core::KeyId;

use crate::claims::{ClaimSet, TokenHeader, TokenType};
use crate::error::{AuthError, Result};
use crate::jwks::Jwk;
use crate::signing::TokenSigner;

/// Verifies compact RS256 tokens against one public key.
pub struct TokenVerifier {
    kid: KeyId,
    key: DecodingKey,
}

impl TokenVerifier {
    /// Create a verifier for the given public JWK.
    ///
    /// # Errors
    ///
    /// Returns an error if the JWK is not a usable RS256 key.
    pub fn new(jwk: &Jwk) -> Result<Self> {
        let key = jwk
            .decoding_key()?
            .ok_or_else(|| AuthError::Config(format!("key {} is not an RS256 key", jwk.kid)))?;
        let kid = KeyId::new(jwk.kid.clone())
            .map_err(|e| AuthError::Config(format!("invalid key id: {e}")))?;
        Ok(Self { kid, key })
    }

    /// Create a verifier for the signer's active key.
    ///
    /// # Errors
    ///
    /// Returns an error if the signer's JWK is not a usable RS256 key.
    pub fn for_signer(signer: &dyn TokenSigner) -> Result<Self> {
        Self::new(signer.public_jwk())
    }

    /// Verify `token` now and return its claims.
    ///
    /// # Errors
    ///
    /// See the module documentation for the error produced by each check.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<ClaimSet> {
        self.verify_at(token, expected, Utc::now().timestamp())
    }

    /// Verify `token` as of `now` (epoch seconds).
    ///
    /// # Errors
    ///
    /// See the module documentation for the error produced by each check.
    pub fn verify_at(&self, token: &str, expected: TokenType, now: i64) -> Result<ClaimSet> {
        let result = self.check(token, expected, now);
        if let Err(e) = &result {
            tracing::debug!(token = %fingerprint(token), error = %e, "Token rejected");
        }
        result
    }

    fn check(&self, token: &str, expected: TokenType, now: i64) -> Result<ClaimSet> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = segments.as_slice() else {
            return Err(AuthError::MalformedToken(format!(
                "expected 3 segments, got {}",
                segments.len()
            )));
        };

        let header: TokenHeader = decode_segment(header_b64, "header")?;
        if header.alg != "RS256" {
            return Err(AuthError::BadSignature);
        }
        if header.kid.as_deref() != Some(self.kid.as_str()) {
            return Err(AuthError::BadSignature);
        }

        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        let valid = jsonwebtoken::crypto::verify(
            signature_b64,
            signing_input.as_bytes(),
            &self.key,
            Algorithm::RS256,
        )
        .unwrap_or(false);
        if !valid {
            return Err(AuthError::BadSignature);
        }

        let claims: ClaimSet = decode_segment(claims_b64, "claims")?;
        if !claims.is_well_formed() {
            return Err(AuthError::MalformedToken("iat after exp".to_string()));
        }
        if claims.is_expired_at(now) {
            return Err(AuthError::TokenExpired);
        }
        if claims.token_type() != expected {
            return Err(AuthError::WrongTokenType {
                expected,
                actual: claims.token_type(),
            });
        }

        Ok(claims)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> Result<T> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("{what}: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedToken(format!("{what}: {e}")))
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::test_signer;
    use slowfall_core::{GroupId, Subject};
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;

    async fn sign(claims: &ClaimSet) -> String {
        let signer = test_signer();
        let header = serde_json::to_vec(&TokenHeader::rs256(signer.key_id().as_str())).unwrap();
        let body = serde_json::to_vec(claims).unwrap();
        let input = format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(header),
            BASE64_URL_SAFE_NO_PAD.encode(body)
        );
        let signature = signer.sign(input.as_bytes()).await.unwrap();
        format!("{input}.{}", BASE64_URL_SAFE_NO_PAD.encode(signature))
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::for_signer(&test_signer()).unwrap()
    }

    fn access_claims(iat: i64) -> ClaimSet {
        ClaimSet::access(
            "slowfall",
            Subject::new("alice").unwrap(),
            vec!["ROLE_USER".into()],
            vec![GroupId::new("g1").unwrap()],
            iat,
            Duration::from_secs(900),
        )
    }

    #[tokio::test]
    async fn round_trip_returns_equal_claims() {
        let claims = access_claims(NOW);
        let token = sign(&claims).await;
        let verified = verifier().verify_at(&token, TokenType::Access, NOW).unwrap();
        assert_eq!(verified, claims);
    }

    #[tokio::test]
    async fn expiry_boundary() {
        let claims = access_claims(NOW - 900);
        let token = sign(&claims).await;
        // exp == NOW
        assert!(verifier().verify_at(&token, TokenType::Access, NOW).is_ok());
        assert!(verifier().verify_at(&token, TokenType::Access, NOW - 1).is_ok());
        assert!(matches!(
            verifier().verify_at(&token, TokenType::Access, NOW + 1),
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn wrong_type_is_distinct() {
        let claims = ClaimSet::refresh(
            "slowfall",
            Subject::new("alice").unwrap(),
            vec![],
            NOW,
            Duration::from_secs(60),
        );
        let token = sign(&claims).await;
        assert!(matches!(
            verifier().verify_at(&token, TokenType::Access, NOW),
            Err(AuthError::WrongTokenType {
                expected: TokenType::Access,
                actual: TokenType::Refresh
            })
        ));
    }

    #[tokio::test]
    async fn tampered_signature_is_bad_signature() {
        let token = sign(&access_claims(NOW)).await;
        let (rest, signature) = token.rsplit_once('.').unwrap();
        let mut bytes = BASE64_URL_SAFE_NO_PAD.decode(signature).unwrap();
        bytes[10] ^= 0x01;
        let tampered = format!("{rest}.{}", BASE64_URL_SAFE_NO_PAD.encode(bytes));

        assert!(matches!(
            verifier().verify_at(&tampered, TokenType::Access, NOW),
            Err(AuthError::BadSignature)
        ));
    }

    #[tokio::test]
    async fn tampered_payload_is_bad_signature() {
        let token = sign(&access_claims(NOW)).await;
        let parts: Vec<&str> = token.split('.').collect();
        let mut payload = BASE64_URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        payload[5] ^= 0x01;
        let tampered = format!(
            "{}.{}.{}",
            parts[0],
            BASE64_URL_SAFE_NO_PAD.encode(payload),
            parts[2]
        );

        assert!(matches!(
            verifier().verify_at(&tampered, TokenType::Access, NOW),
            Err(AuthError::BadSignature)
        ));
    }

    #[tokio::test]
    async fn undecodable_signature_is_bad_signature() {
        let token = sign(&access_claims(NOW)).await;
        let (rest, _) = token.rsplit_once('.').unwrap();
        let tampered = format!("{rest}.!!!not-base64!!!");
        assert!(matches!(
            verifier().verify_at(&tampered, TokenType::Access, NOW),
            Err(AuthError::BadSignature)
        ));
    }

    #[tokio::test]
    async fn foreign_kid_is_bad_signature() {
        let claims = access_claims(NOW);
        let header = BASE64_URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&TokenHeader::rs256("other-key")).unwrap());
        let token = sign(&claims).await;
        let rest: Vec<&str> = token.splitn(2, '.').collect();
        let forged = format!("{header}.{}", rest[1]);

        assert!(matches!(
            verifier().verify_at(&forged, TokenType::Access, NOW),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn malformed_inputs() {
        let v = verifier();
        for token in ["", "abc", "a.b", "a.b.c.d", "%%%.e30.sig"] {
            assert!(
                matches!(
                    v.verify_at(token, TokenType::Access, NOW),
                    Err(AuthError::MalformedToken(_))
                ),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn none_algorithm_is_rejected() {
        let header = BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"none","kid":"test-key"}"#);
        let claims = BASE64_URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&access_claims(NOW)).unwrap());
        let token = format!("{header}.{claims}.");
        assert!(matches!(
            verifier().verify_at(&token, TokenType::Access, NOW),
            Err(AuthError::BadSignature)
        ));
    }
}
