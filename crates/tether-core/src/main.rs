//! Tether Server - Entry Point
//!
//! This binary starts the Tether HTTP server.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_core::{config::Config, server};

/// Session-scoped chat backend server.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about)]
struct Args {
    /// Path to the TOML config file (defaults to ./tether.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configured address's port
    #[arg(long)]
    client_port: Option<u16>,

    /// Directory holding backend manifests
    #[arg(long)]
    backends_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tether_core=debug,tether_models=info,info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.client_port {
        config = config.with_port(port);
    }
    if let Some(dir) = args.backends_dir {
        config = config.with_backends_dir(dir);
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        signal.cancel();
    });

    info!(
        address = %config.server.address,
        backends_dir = %config.backends.dir.display(),
        idle_timeout_secs = config.cache.idle_timeout_secs,
        "Starting Tether"
    );
    server::run(&config, shutdown).await.context("Server error")?;
    Ok(())
}
