//! Slowfall Gateway - token authentication over HTTP
//!
//! This is the main entry point for the gateway service.
//! Configuration is read from environment variables; see
//! [`GatewayConfig::from_env`].
//!
//! # Dev Mode
//!
//! Set `SLOWFALL_DEV_MODE=true` to run without any key material: an
//! ephemeral signing key is generated, a `dev`/`devpass` user is available
//! for login, and requests under `/api/dev/` without a token are
//! authenticated as `dev` (or the `X-Dev-User` header).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slowfall_gateway::{create_router, GatewayConfig, GatewayState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,slowfall=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Slowfall Gateway");

    // Load configuration from environment
    let config = GatewayConfig::from_env()?;
    let listen_addr = config.listen_addr.clone();

    tracing::info!(
        listen_addr = %listen_addr,
        dev_mode = config.auth.dev_mode,
        issuer = %config.auth.issuer,
        key_vault = config.auth.key_vault.is_some(),
        cors_origins = ?config.cors_origins,
        "Gateway configuration loaded"
    );

    if config.auth.dev_mode {
        tracing::warn!("DEV MODE ENABLED - ephemeral keys, dev user and auth bypass are active");
        tracing::warn!(prefix = %config.dev_bypass_prefix, "Dev bypass prefix");
    }

    // Build shared state: signer, verifier, credential cache, policy
    let state = GatewayState::from_config(config).await?;
    tracing::info!(
        backend = %state.signer().backend(),
        allowed_group = %state.policy.allowed_group(),
        "Auth components initialized"
    );

    let app = create_router(state);
    tracing::info!("Router configured");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
