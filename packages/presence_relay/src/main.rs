use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use presence_relay::config::{CliOverrides, DEFAULT_CONFIG_FILE, RelayConfig};
use presence_relay::{AppState, Relay, create_router};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Real-time cursor presence and chat relay")]
struct Cli {
    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file (defaults to ./relay.toml; missing file is fine)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "presence_relay=debug,relay=debug,tower_http=debug,info"
    } else {
        "presence_relay=info,relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let overrides = CliOverrides {
        host: cli.host,
        port: cli.port,
    };
    let config = RelayConfig::load(&config_file, &overrides)?;

    let state = AppState {
        relay: Arc::new(Relay::new()),
        websocket: Arc::new(config.websocket.clone()),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Presence relay listening on {}", actual_addr);
    info!("  WS     /ws            - Relay connection");
    info!("  GET    /status        - Connection and cursor counts");
    info!("  GET    /metrics       - Relay metrics");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
