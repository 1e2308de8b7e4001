//! Slowfall CLI - password hashing and gateway token operations.
//!
//! This is the entry point for the `slowfall` binary.

mod client;
mod types;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::{Parser, Subcommand};

use client::GatewayClient;
use types::format_expiry;

/// Default bcrypt cost for `hash-password`.
const DEFAULT_HASH_COST: u32 = 12;

/// Slowfall CLI - password hashing and gateway token operations.
#[derive(Parser, Debug)]
#[command(name = "slowfall")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gateway URL.
    #[arg(
        long,
        global = true,
        env = "SLOWFALL_GATEWAY",
        default_value = "http://localhost:8080"
    )]
    gateway: String,

    /// Print raw JSON instead of a summary.
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    /// Enable debug logging.
    #[arg(long, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a bcrypt hash of a password, for the vault credential secret.
    HashPassword {
        /// Password to hash. Read from stdin when omitted.
        password: Option<String>,

        /// bcrypt cost factor.
        #[arg(long, default_value_t = DEFAULT_HASH_COST)]
        cost: u32,
    },

    /// Log in and print the token pair.
    Login {
        /// Username.
        #[arg(long, short, env = "SLOWFALL_USERNAME")]
        username: String,

        /// Password. Read from stdin when omitted.
        #[arg(long, env = "SLOWFALL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Exchange a refresh token for a new access token.
    Refresh {
        /// Refresh token from a previous login.
        #[arg(env = "SLOWFALL_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },

    /// Print the gateway's public key set.
    Jwks,

    /// Call the protected probe resource with an access token.
    Probe {
        /// Access token.
        #[arg(env = "SLOWFALL_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter("slowfall_cli=debug,warn")
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Command::HashPassword { password, cost } => {
            let password = match password {
                Some(p) => p,
                None => read_secret("Password: ")?,
            };
            let hash = slowfall_auth::hash_password(&password, cost)
                .context("failed to hash password")?;
            println!("{hash}");
        }
        Command::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => read_secret("Password: ")?,
            };
            let client = GatewayClient::new(&args.gateway)?;
            let tokens = client
                .login(&username, &password)
                .await
                .with_context(|| format!("login to {} failed", client.base_url()))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&tokens)?);
            } else {
                println!("access token:  {}", tokens.access_token);
                println!("  expires:     {}", format_expiry(tokens.access_token_expires_at));
                println!("refresh token: {}", tokens.refresh_token);
                println!("  expires:     {}", format_expiry(tokens.refresh_token_expires_at));
            }
        }
        Command::Refresh { refresh_token } => {
            let client = GatewayClient::new(&args.gateway)?;
            let access = client
                .refresh(&refresh_token)
                .await
                .context("refresh failed")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&access)?);
            } else {
                println!("access token:  {}", access.access_token);
                println!("  expires:     {}", format_expiry(access.access_token_expires_at));
            }
        }
        Command::Jwks => {
            let client = GatewayClient::new(&args.gateway)?;
            let jwks = client.jwks().await.context("failed to fetch key set")?;
            println!("{}", serde_json::to_string_pretty(&jwks)?);
        }
        Command::Probe { access_token } => {
            let client = GatewayClient::new(&args.gateway)?;
            let probe = client.probe(&access_token).await.context("probe failed")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&probe)?);
            } else {
                println!("{} as {}", probe.status, probe.subject);
            }
        }
    }

    Ok(())
}

/// Read one line from stdin, prompting on stderr when interactive.
fn read_secret(prompt: &str) -> anyhow::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    anyhow::ensure!(!secret.is_empty(), "empty input");
    Ok(secret)
}
