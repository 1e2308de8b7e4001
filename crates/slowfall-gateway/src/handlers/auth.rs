//! Login and refresh endpoints.

use std::fmt;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::GatewayState;

/// Login request body.
#[derive(Deserialize)]
pub struct LoginRequest {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Successful login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Access token.
    pub access_token: String,
    /// Access token expiry, epoch seconds.
    pub access_token_expires_at: i64,
    /// Refresh token.
    pub refresh_token: String,
    /// Refresh token expiry, epoch seconds.
    pub refresh_token_expires_at: i64,
}

/// Refresh request body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// A refresh token from a previous login.
    pub refresh_token: String,
}

/// Successful refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// New access token.
    pub access_token: String,
    /// Access token expiry, epoch seconds.
    pub access_token_expires_at: i64,
}

/// Exchange a username and password for a token pair.
///
/// ```text
/// POST /auth/login
/// {"username": "dev", "password": "devpass"}
///
/// Response: 200 OK
/// {
///   "accessToken": "eyJ...",
///   "accessTokenExpiresAt": 1700000900,
///   "refreshToken": "eyJ...",
///   "refreshTokenExpiresAt": 1700604800
/// }
/// ```
///
/// # Errors
///
/// `401 invalid_credentials` on a bad username/password, `500
/// signing_unavailable` if the token cannot be signed.
pub async fn login(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let principal = state
        .authenticator
        .authenticate(&request.username, &request.password)
        .await?;
    let pair = state.issuer.issue_pair(&principal).await?;

    Ok(Json(LoginResponse {
        access_token: pair.access.token,
        access_token_expires_at: pair.access.expires_at.timestamp(),
        refresh_token: pair.refresh.token,
        refresh_token_expires_at: pair.refresh.expires_at.timestamp(),
    }))
}

/// Exchange a refresh token for a new access token.
///
/// The refresh token is not rotated; it stays usable until it expires.
///
/// # Errors
///
/// `401 invalid_token` for an access token, `401 invalid_refresh_token` for
/// a malformed, forged or expired one.
pub async fn refresh(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let access = state
        .issuer
        .refresh(&request.refresh_token)
        .await
        .map_err(ApiError::from_refresh_error)?;

    Ok(Json(RefreshResponse {
        access_token: access.token,
        access_token_expires_at: access.expires_at.timestamp(),
    }))
}
