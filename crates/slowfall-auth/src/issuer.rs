//! Token issuance.

use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use chrono::Utc;

use slowfall_core::redact::fingerprint;
use slowfall_core::{GroupId, Subject};

use crate::claims::{ClaimSet, IssuedToken, TokenHeader, TokenType};
use crate::directory::{resolve_roles, Principal, UserDirectory};
use crate::error::{AuthError, Result};
use crate::signing::TokenSigner;
use crate::verifier::TokenVerifier;
use crate::AuthSettings;

/// An access token together with its refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Short-lived access token.
    pub access: IssuedToken,
    /// Long-lived refresh token.
    pub refresh: IssuedToken,
}

/// Builds claim sets and signs them into compact tokens.
pub struct TokenIssuer {
    signer: Arc<dyn TokenSigner>,
    verifier: Arc<TokenVerifier>,
    directory: Arc<dyn UserDirectory>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer.
    #[must_use]
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        verifier: Arc<TokenVerifier>,
        directory: Arc<dyn UserDirectory>,
        settings: &AuthSettings,
    ) -> Self {
        Self {
            signer,
            verifier,
            directory,
            issuer: settings.issuer.clone(),
            access_ttl: settings.access_token_ttl,
            refresh_ttl: settings.refresh_token_ttl,
        }
    }

    /// Issue an access token.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if the backend fails.
    pub async fn issue_access_token(
        &self,
        subject: Subject,
        roles: Vec<String>,
        groups: Vec<GroupId>,
    ) -> Result<IssuedToken> {
        let claims = ClaimSet::access(
            &self.issuer,
            subject,
            roles,
            groups,
            Utc::now().timestamp(),
            self.access_ttl,
        );
        self.sign(&claims).await
    }

    /// Issue a refresh token.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if the backend fails.
    pub async fn issue_refresh_token(
        &self,
        subject: Subject,
        groups: Vec<GroupId>,
    ) -> Result<IssuedToken> {
        let claims = ClaimSet::refresh(
            &self.issuer,
            subject,
            groups,
            Utc::now().timestamp(),
            self.refresh_ttl,
        );
        self.sign(&claims).await
    }

    /// Issue the access/refresh pair returned by a successful login.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if the backend fails.
    pub async fn issue_pair(&self, principal: &Principal) -> Result<TokenPair> {
        let access = self
            .issue_access_token(
                principal.subject.clone(),
                principal.roles.clone(),
                principal.groups.clone(),
            )
            .await?;
        let refresh = self
            .issue_refresh_token(principal.subject.clone(), principal.groups.clone())
            .await?;

        tracing::info!(
            subject = %principal.subject.masked(),
            access = %fingerprint(&access.token),
            "Issued token pair"
        );
        Ok(TokenPair { access, refresh })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Roles are re-resolved from the directory; groups are carried over from the
    /// refresh token. The refresh token itself is not rotated.
    ///
    /// # Errors
    ///
    /// Returns the verifier's error for an unusable refresh token, or `Signing`
    /// if the backend fails.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken> {
        let claims = self.verifier.verify(refresh_token, TokenType::Refresh)?;
        let subject = claims.subject().clone();
        let roles = resolve_roles(self.directory.as_ref(), &subject).await;

        let access = self
            .issue_access_token(subject, roles, claims.groups().to_vec())
            .await?;
        tracing::info!(
            subject = %claims.subject().masked(),
            refresh = %fingerprint(refresh_token),
            "Refreshed access token"
        );
        Ok(access)
    }

    /// Sign a claim set into a compact token.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if the backend fails.
    pub async fn sign(&self, claims: &ClaimSet) -> Result<IssuedToken> {
        let header = TokenHeader::rs256(self.signer.key_id().as_str());
        let header_json =
            serde_json::to_vec(&header).map_err(|e| AuthError::Internal(e.to_string()))?;
        let claims_json =
            serde_json::to_vec(claims).map_err(|e| AuthError::Internal(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(header_json),
            BASE64_URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = self.signer.sign(signing_input.as_bytes()).await?;

        Ok(IssuedToken {
            token: format!("{signing_input}.{}", BASE64_URL_SAFE_NO_PAD.encode(signature)),
            expires_at: claims.expiry(),
        })
    }

    /// The signer's backend, for health reporting.
    #[must_use]
    pub fn signer(&self) -> &Arc<dyn TokenSigner> {
        &self.signer
    }
}
