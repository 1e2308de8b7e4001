//! API error types and responses.
//!
//! Every error is returned as `{"error": "<code>"}`. Tokens, passwords and
//! backend details never reach the body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use slowfall_auth::AuthError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, invalid or expired bearer token.
    #[error("unauthorized")]
    Unauthorized,

    /// Identity lacks the required authority.
    #[error("forbidden")]
    Forbidden,

    /// Username/password rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A token of the wrong type was presented.
    #[error("invalid token")]
    InvalidToken,

    /// The refresh token is malformed, forged or expired.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// The signing backend could not produce a token.
    #[error("signing unavailable")]
    SigningUnavailable,

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized
            | Self::InvalidCredentials
            | Self::InvalidToken
            | Self::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::SigningUnavailable | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidToken => "invalid_token",
            Self::InvalidRefreshToken => "invalid_refresh_token",
            Self::SigningUnavailable => "signing_unavailable",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Map an error from the refresh flow.
    ///
    /// A token of the wrong type is `invalid_token`; any other token rejection
    /// is `invalid_refresh_token`.
    #[must_use]
    pub fn from_refresh_error(err: AuthError) -> Self {
        match err {
            AuthError::WrongTokenType { .. } => Self::InvalidToken,
            err if err.is_token_rejection() => Self::InvalidRefreshToken,
            err => Self::from(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }
        (status, Json(ErrorResponse { error: self.code() })).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::MalformedToken(_) | AuthError::BadSignature | AuthError::TokenExpired => {
                Self::Unauthorized
            }
            AuthError::WrongTokenType { .. } => Self::InvalidToken,
            AuthError::Forbidden => Self::Forbidden,
            AuthError::Signing(signing) => {
                tracing::error!(error = %signing, "Signing backend failure");
                Self::SigningUnavailable
            }
            AuthError::MisconfiguredAuthority(_)
            | AuthError::Config(_)
            | AuthError::Internal(_) => {
                tracing::error!(error = %err, "Auth internal error");
                Self::Internal("authentication service error".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slowfall_auth::{SigningError, TokenType};

    #[test]
    fn error_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::InvalidRefreshToken.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::SigningUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn auth_error_mapping() {
        assert!(matches!(
            ApiError::from(AuthError::TokenExpired),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from(AuthError::InvalidCredentials),
            ApiError::InvalidCredentials
        ));
        assert!(matches!(
            ApiError::from(AuthError::Signing(SigningError::PermissionDenied)),
            ApiError::SigningUnavailable
        ));
        assert!(matches!(
            ApiError::from(AuthError::Config("x".into())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn refresh_error_mapping() {
        let wrong_type = AuthError::WrongTokenType {
            expected: TokenType::Refresh,
            actual: TokenType::Access,
        };
        assert_eq!(ApiError::from_refresh_error(wrong_type).code(), "invalid_token");
        for err in [
            AuthError::TokenExpired,
            AuthError::BadSignature,
            AuthError::MalformedToken("x".into()),
        ] {
            assert_eq!(ApiError::from_refresh_error(err).code(), "invalid_refresh_token");
        }
        assert_eq!(
            ApiError::from_refresh_error(AuthError::Signing(SigningError::Unreachable("x".into())))
                .code(),
            "signing_unavailable"
        );
    }

    #[tokio::test]
    async fn body_is_flat_code() {
        let response = ApiError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "invalid_credentials"}));
    }
}
