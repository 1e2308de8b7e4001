//! Authentication error types.

use thiserror::Error;

use crate::claims::TokenType;
use crate::keyvault::VaultError;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors produced by a signing backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    /// The remote key does not exist.
    #[error("signing key not found: {0}")]
    KeyNotFound(String),

    /// The remote key exists but is disabled.
    #[error("signing key disabled: {0}")]
    KeyDisabled(String),

    /// The key service refused the operation.
    #[error("permission denied by key service")]
    PermissionDenied,

    /// The key service could not be reached.
    #[error("key service unreachable: {0}")]
    Unreachable(String),

    /// The key service returned an unexpected failure.
    #[error("key service error: {0}")]
    Remote(String),

    /// Local key material could not be loaded or used.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

impl From<VaultError> for SigningError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::NotFound(name) => Self::KeyNotFound(name),
            VaultError::Disabled(name) => Self::KeyDisabled(name),
            VaultError::PermissionDenied => Self::PermissionDenied,
            VaultError::Unreachable(msg) => Self::Unreachable(msg),
            VaultError::Credential(msg) | VaultError::Remote(msg) => Self::Remote(msg),
        }
    }
}

/// Errors that can occur during authentication and authorization.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Username/password authentication failed.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The token could not be decoded.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The token signature, algorithm or key ID did not check out.
    #[error("bad signature")]
    BadSignature,

    /// The token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The token is valid but of the wrong kind.
    #[error("wrong token type: expected {expected}, got {actual}")]
    WrongTokenType {
        /// The type the caller asked for.
        expected: TokenType,
        /// The type carried by the token.
        actual: TokenType,
    },

    /// The caller is authenticated but lacks the required authority.
    #[error("insufficient authority")]
    Forbidden,

    /// The signing backend failed.
    #[error("signing unavailable: {0}")]
    Signing(#[from] SigningError),

    /// No allowed group is configured outside development.
    #[error("misconfigured authority: {0}")]
    MisconfiguredAuthority(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if this error indicates the client should retry, possibly with a new token.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired | Self::Signing(SigningError::Unreachable(_))
        )
    }

    /// Returns `true` if the token itself was rejected (as opposed to a server-side failure).
    #[must_use]
    pub const fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_)
                | Self::BadSignature
                | Self::TokenExpired
                | Self::WrongTokenType { .. }
        )
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidCredentials
            | Self::MalformedToken(_)
            | Self::BadSignature
            | Self::TokenExpired
            | Self::WrongTokenType { .. } => 401,
            Self::Forbidden => 403,
            Self::Signing(_)
            | Self::MisconfiguredAuthority(_)
            | Self::Config(_)
            | Self::Internal(_) => 500,
        }
    }
}
