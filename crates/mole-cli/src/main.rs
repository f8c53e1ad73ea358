//! mole: Tunnel Manager
//!
//! Main entry point. Initializes the global allocator, sets up logging,
//! and dispatches to the server or client side:
//!
//! ```text
//! mole serve   <config.toml>          run the companion server
//! mole connect <tunnel.toml>          establish a tunnel and supervise it
//! mole ticket  <server-url> <user>    obtain a ticket (password from
//!                                     MOLE_PASSWORD or stdin)
//! mole digest  <password>             print the config digest for a password
//! ```

use anyhow::{anyhow, bail, Context, Result};
use mole_tunnel::{ApiClient, TunnelConfig, TunnelManager};
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const USAGE: &str = "usage:
  mole serve   <config.toml>
  mole connect <tunnel.toml>
  mole ticket  <server-url> <user>
  mole digest  <password>";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("serve") => serve(args.get(1)).await,
        Some("connect") => connect(args.get(1)).await,
        Some("ticket") => ticket(args.get(1), args.get(2)).await,
        Some("digest") => digest(args.get(1)),
        _ => bail!("{USAGE}"),
    }
}

async fn serve(config_path: Option<&String>) -> Result<()> {
    let path = config_path.ok_or_else(|| anyhow!("{USAGE}"))?;
    let config = mole_server::ServerConfig::from_file(Path::new(path))
        .with_context(|| format!("loading {path}"))?;

    info!("mole server starting");
    mole_server::serve(config).await?;
    Ok(())
}

async fn connect(tunnel_path: Option<&String>) -> Result<()> {
    let path = tunnel_path.ok_or_else(|| anyhow!("{USAGE}"))?;
    let config = TunnelConfig::from_file(Path::new(path))
        .with_context(|| format!("loading {path}"))?;

    let mut tunnel = TunnelManager::new(config);
    tunnel.connect().await?;

    // Supervise until the chain drops for good or the user interrupts.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                tunnel.disconnect().await;
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                if !tunnel.is_chain_alive().await {
                    warn!("tunnel dropped");
                    if tunnel.reconnect().await.is_err() {
                        tunnel.disconnect().await;
                        bail!("tunnel lost and could not be re-established");
                    }
                }
            }
        }
    }
}

async fn ticket(url: Option<&String>, user: Option<&String>) -> Result<()> {
    let (url, user) = match (url, user) {
        (Some(url), Some(user)) => (url, user),
        _ => bail!("{USAGE}"),
    };

    let password = match std::env::var("MOLE_PASSWORD") {
        Ok(password) => password,
        Err(_) => {
            eprintln!("password for {user}:");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("reading password")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let client = ApiClient::new(url)?;
    let ticket = client.fetch_ticket(user, &password, None).await?;

    // The ticket string is the whole output, fit for scripting.
    println!("{ticket}");
    Ok(())
}

fn digest(password: Option<&String>) -> Result<()> {
    let password = password.ok_or_else(|| anyhow!("{USAGE}"))?;
    println!("{}", mole_server::hash_password(password));
    Ok(())
}
