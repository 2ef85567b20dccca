//! Dynamic HTTP server (v1)
//!
//! Serves endpoints declared in a TOML file and keeps them in sync with the
//! file while running.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────────┐
//!                 │                     dynhttp                        │
//!  Client request │  ┌─────────┐    ┌────────────┐    ┌─────────────┐  │
//!  ───────────────┼─▶│  http   │───▶│ dispatcher │───▶│ RoutingTable│  │
//!                 │  │ server  │    │ (ArcSwap)  │    │  (current)  │  │
//!                 │  └─────────┘    └─────▲──────┘    └──────┬──────┘  │
//!                 │                       │ replace          ▼         │
//!                 │                 ┌─────┴──────┐     endpoint handler│
//!  config / API   │                 │  registry  │                     │
//!  ───────────────┼────────────────▶│ add/remove │                     │
//!                 │                 └────────────┘                     │
//!                 └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use dynhttp::config::watcher::ConfigWatcher;
use dynhttp::config::{load_config, ServerConfig};
use dynhttp::lifecycle::{signals, Shutdown};
use dynhttp::observability::{logging, metrics};
use dynhttp::DynHttpServer;

#[derive(Parser)]
#[command(name = "dynhttp")]
#[command(about = "HTTP server with endpoints that change at runtime", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Reload endpoints when the configuration file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("dynhttp v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        endpoints = config.endpoints.len(),
        strict_slash = config.routing.strict_slash,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the server.
    let (config_updates, _watcher, updates_tx) = match &cli.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            let tx = watcher.sender();
            tokio::spawn(signals::reload_on_hangup(path.clone(), tx.clone()));
            let handle = if cli.watch { Some(watcher.run()?) } else { None };
            (rx, handle, Some(tx))
        }
        None => {
            let (_, rx) = mpsc::unbounded_channel();
            (rx, None, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = DynHttpServer::new(config)?;
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        signals::shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener, config_updates, server_shutdown).await?;
    drop(updates_tx);

    tracing::info!("Shutdown complete");
    Ok(())
}
