//! Party Relay Server
//!
//! WebSocket relay for watch-party style sessions.
//!
//! # Usage
//!
//! ```bash
//! # Defaults, or the per-user config file if present
//! party-relay
//!
//! # Explicit config file with a port override
//! party-relay --config /etc/party-relay/config.toml --port 9000
//!
//! # Print the effective configuration and exit
//! party-relay --print-config
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use party_core::Config;
use party_relay::RelayServer;

#[derive(Parser, Debug)]
#[command(name = "party-relay")]
#[command(about = "WebSocket relay for shared sessions and invitations")]
#[command(version)]
struct Args {
    /// Config file (defaults to the per-user config location)
    #[arg(short, long, env = "PARTY_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address (overrides the config file)
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let addr = config.server.socket_addr();
    info!("Starting Party Relay");
    info!(
        "Room size {}, rate {} burst / {} per sec",
        config.limits.max_room_size, config.limits.rate_burst, config.limits.rate_sustained
    );

    let server = RelayServer::new(config);

    tokio::select! {
        result = server.serve_on(addr) => {
            result.with_context(|| format!("relay server on {} failed", addr))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!(
                "Shutting down ({} rooms, {} users)",
                server.hub().room_count(),
                server.hub().user_count()
            );
        }
    }

    Ok(())
}
