//! Public key set endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use slowfall_auth::JwkSet;

use crate::state::GatewayState;

/// Publish the verification key.
///
/// ```text
/// GET /.well-known/jwks.json
///
/// Response: 200 OK
/// {"keys": [{"kty": "RSA", "n": "...", "e": "AQAB", "kid": "...", "alg": "RS256", "use": "sig"}]}
/// ```
pub async fn jwks(State(state): State<Arc<GatewayState>>) -> Json<JwkSet> {
    Json(JwkSet::single(state.signer().public_jwk().clone()))
}
