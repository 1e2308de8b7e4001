//! Protected resources.
//!
//! These exist so clients can check that a token (or the development bypass)
//! gets through the authorization policy.

use axum::Json;
use serde::Serialize;

use slowfall_auth::IdentityOrigin;

use crate::auth::AuthUser;

/// Response of the protected probe.
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    /// Always `ok`.
    pub status: &'static str,
    /// The caller.
    pub subject: String,
}

/// Caller details.
#[derive(Debug, Serialize)]
pub struct WhoAmI {
    /// The caller.
    pub subject: String,
    /// Granted authorities.
    pub authorities: Vec<String>,
    /// Epoch seconds after which the identity is no longer valid.
    pub expires_at: i64,
    /// `token`, `dev_bypass` or `upstream`.
    pub origin: &'static str,
}

/// `GET /api/protected/resource`
pub async fn resource(AuthUser(identity): AuthUser) -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "ok",
        subject: identity.subject().to_string(),
    })
}

/// `GET {bypass prefix}whoami`
pub async fn whoami(AuthUser(identity): AuthUser) -> Json<WhoAmI> {
    let origin = match identity.origin() {
        IdentityOrigin::Token => "token",
        IdentityOrigin::DevBypass => "dev_bypass",
        IdentityOrigin::Upstream => "upstream",
    };
    Json(WhoAmI {
        subject: identity.subject().to_string(),
        authorities: identity.authorities().iter().map(ToString::to_string).collect(),
        expires_at: identity.expires_at().timestamp(),
        origin,
    })
}
