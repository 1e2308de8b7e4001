//! Health check endpoint.
//!
//! This module provides the public health check endpoint. Backend checks are
//! reused for [`HEALTH_CACHE_TTL`] so unauthenticated traffic cannot drive a
//! Key Vault request per call.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use slowfall_auth::SigningBackend;

use crate::state::GatewayState;

/// How long a backend check result is reused.
pub const HEALTH_CACHE_TTL: Duration = Duration::from_secs(10);

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Signing backend status.
    pub signing: SigningHealth,
    /// Vault credential status, when a credential secret is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialHealth>,
}

/// Signing backend status.
#[derive(Debug, Serialize)]
pub struct SigningHealth {
    /// Which backend signs tokens.
    pub backend: SigningBackend,
    /// Whether the backend answered.
    pub available: bool,
}

/// Vault credential status.
#[derive(Debug, Serialize)]
pub struct CredentialHealth {
    /// Whether the credential secret was fetched and parsed.
    pub available: bool,
}

/// Result of one round of backend checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    /// Signing backend reachable.
    pub signing: bool,
    /// Credential secret usable; `None` if not configured.
    pub credentials: Option<bool>,
}

impl BackendStatus {
    /// Returns `true` if every configured backend is available.
    #[must_use]
    pub fn is_healthy(self) -> bool {
        self.signing && self.credentials.unwrap_or(true)
    }
}

/// Last backend check, reused within a TTL.
#[derive(Debug)]
pub struct HealthCache {
    ttl: Duration,
    last: Mutex<Option<(Instant, BackendStatus)>>,
}

impl HealthCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last: Mutex::new(None),
        }
    }

    /// The cached status if it is younger than the TTL.
    fn fresh(&self) -> Option<BackendStatus> {
        let last = self.last.lock();
        last.as_ref()
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, status)| *status)
    }

    fn store(&self, status: BackendStatus) {
        *self.last.lock() = Some((Instant::now(), status));
    }
}

impl Default for HealthCache {
    fn default() -> Self {
        Self::new(HEALTH_CACHE_TTL)
    }
}

/// Run the backend checks, or reuse a recent result.
async fn backend_status(state: &GatewayState) -> BackendStatus {
    if let Some(status) = state.health.fresh() {
        return status;
    }

    let signer = state.signer();
    let signing = match signer.check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(backend = %signer.backend(), error = %e, "Signing backend unavailable");
            false
        }
    };

    let credentials = match state.authenticator.credentials() {
        Some(cache) => {
            let available = cache.check().await;
            if !available {
                tracing::warn!("Vault credential unavailable");
            }
            Some(available)
        }
        None => None,
    };

    let status = BackendStatus {
        signing,
        credentials,
    };
    state.health.store(status);
    status
}

/// Health check handler.
///
/// Returns the current service status. This endpoint is public and
/// does not require authentication. An unreachable signing backend or an
/// unusable vault credential reports `degraded` rather than failing the request.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "signing": {"backend": "key_vault", "available": true},
///   "credentials": {"available": true}
/// }
/// ```
pub async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let status = backend_status(&state).await;

    let response = HealthResponse {
        status: if status.is_healthy() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        signing: SigningHealth {
            backend: state.signer().backend(),
            available: status.signing,
        },
        credentials: status
            .credentials
            .map(|available| CredentialHealth { available }),
    };

    (StatusCode::OK, Json(response))
}
