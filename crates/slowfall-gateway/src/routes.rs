//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::authenticate;
use crate::handlers::{auth, health, jwks, protected};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check with signing backend status
/// - `GET /.well-known/jwks.json` - Verification key set
/// - `POST /auth/login` - Username/password login
/// - `POST /auth/refresh` - Exchange a refresh token
///
/// ## Protected (allowed group required)
/// - `GET /api/protected/resource` - Probe resource
/// - `GET {bypass prefix}whoami` - Caller details; reachable through the
///   development bypass
///
/// Layers, outermost first: tracing, CORS (answers preflights before any
/// authentication), body limit, timeout, authentication.
pub fn create_router(state: GatewayState) -> Router {
    // Extract config values before moving state
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();
    let whoami_path = format!("{}whoami", state.config.dev_bypass_prefix);
    let cors = state.cors.layer();

    let state = Arc::new(state);

    Router::new()
        // Public
        .route("/health", get(health::health))
        .route("/.well-known/jwks.json", get(jwks::jwks))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        // Protected
        .route("/api/protected/resource", get(protected::resource))
        .route(&whoami_path, get(protected::whoami))
        // Middleware
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            authenticate,
        ))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
