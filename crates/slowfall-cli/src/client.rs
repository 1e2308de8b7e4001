//! HTTP client for the gateway REST API.
//!
//! This module provides a typed client for interacting with the slowfall-gateway.

use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;

use slowfall_auth::JwkSet;

use crate::types::{
    ApiErrorResponse, LoginRequest, LoginResponse, ProbeResponse, RefreshRequest, RefreshResponse,
};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {code}")]
    Api { status: u16, code: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// A token cannot be sent as a header.
    #[error("token contains characters not allowed in a header")]
    InvalidToken,
}

/// Client for the gateway REST API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    /// Create a new gateway client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the gateway (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Handle API error responses.
    async fn handle_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let code = match response.json::<ApiErrorResponse>().await {
            Ok(err) => err.error,
            Err(_) => "unknown_error".to_string(),
        };
        ClientError::Api { status, code }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    // =========================================================================
    // Auth Operations
    // =========================================================================

    /// Log in with a username and password.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, ClientError> {
        let url = format!("{}/auth/login", self.base_url);
        tracing::debug!(url = %url, username = %username, "Logging in");

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
        let url = format!("{}/auth/refresh", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Fetch the gateway's verification keys.
    pub async fn jwks(&self) -> Result<JwkSet, ClientError> {
        let url = format!("{}/.well-known/jwks.json", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::parse(response).await
    }

    /// Call the protected probe resource with an access token.
    pub async fn probe(&self, access_token: &str) -> Result<ProbeResponse, ClientError> {
        let url = format!("{}/api/protected/resource", self.base_url);
        let bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|_| ClientError::InvalidToken)?;

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, bearer)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
