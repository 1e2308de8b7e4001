//! API request and response types for the gateway client.
//!
//! These types mirror the bodies of the slowfall-gateway API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Auth Types
// =============================================================================

/// Request to log in.
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    /// Username.
    pub username: &'a str,
    /// Password.
    pub password: &'a str,
}

/// Token pair returned by a login.
#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// Request to refresh an access token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    /// Refresh token.
    pub refresh_token: &'a str,
}

/// Access token returned by a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// Access token.
    pub access_token: String,
    /// Access token expiry, epoch seconds.
    pub access_token_expires_at: i64,
}

// =============================================================================
// Other Types
// =============================================================================

/// Response of the protected probe resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// `ok` when access was granted.
    pub status: String,
    /// The authenticated subject.
    pub subject: String,
}

/// Error response from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error code, e.g. `invalid_credentials`.
    pub error: String,
}

/// Render an epoch-seconds expiry for humans.
#[must_use]
pub fn format_expiry(epoch_seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch_seconds, 0)
        .map_or_else(|| epoch_seconds.to_string(), |t| t.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_response_uses_camel_case() {
        let body = r#"{
            "accessToken": "a",
            "accessTokenExpiresAt": 1700000900,
            "refreshToken": "r",
            "refreshTokenExpiresAt": 1700604800
        }"#;
        let parsed: LoginResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.access_token, "a");
        assert_eq!(parsed.refresh_token_expires_at, 1_700_604_800);
    }

    #[test]
    fn refresh_request_shape() {
        let json = serde_json::to_value(RefreshRequest { refresh_token: "r" }).unwrap();
        assert_eq!(json, serde_json::json!({"refreshToken": "r"}));
    }

    #[test]
    fn expiry_formatting() {
        assert_eq!(format_expiry(0), "1970-01-01T00:00:00+00:00");
    }
}
