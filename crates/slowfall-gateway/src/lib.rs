//! HTTP gateway for slowfall token authentication.
//!
//! This crate exposes token issuance and verification over HTTP and guards
//! protected paths. It handles:
//!
//! - Login and refresh (`/auth/login`, `/auth/refresh`)
//! - Publishing the verification key (`/.well-known/jwks.json`)
//! - Bearer token authentication and group-based authorization
//! - A development bypass for local work
//! - Credentialed CORS for browser clients
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                               │
//! │                 (browser / CLI / services)                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     slowfall-gateway                         │
//! │  ┌──────────┐ ┌──────────────┐ ┌──────────┐ ┌───────────┐   │
//! │  │   CORS   │▶│  Dev Bypass  │▶│  Bearer  │▶│  Policy   │   │
//! │  │          │ │     Gate     │ │  Verify  │ │ 401 / 403 │   │
//! │  └──────────┘ └──────────────┘ └──────────┘ └───────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌────────────┐
//!        │  Token   │   │  Local   │   │ Key Vault  │
//!        │  Issuer  │   │ RSA key  │   │ key/secret │
//!        └──────────┘   └──────────┘   └────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use slowfall_gateway::{create_router, GatewayConfig, GatewayState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env()?;
//! let listen_addr = config.listen_addr.clone();
//!
//! // Connects to Key Vault if configured and selects the signing backend
//! let state = GatewayState::from_config(config).await?;
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod bypass;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{ConfigError, GatewayConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::AuthUser;
pub use bypass::{BypassState, DevBypassGate};
pub use cors::CorsNegotiator;
