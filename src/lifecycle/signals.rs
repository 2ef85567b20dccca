//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM / SIGINT (Ctrl+C) and trigger graceful shutdown
//! - Turn SIGHUP into a configuration reload
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed never fires, it does not abort

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::config::ServerConfig;

/// Resolve once Ctrl+C or SIGTERM is received.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Termination signal received");
}

/// Reload `path` into `updates` on every SIGHUP until the receiver goes away.
#[cfg(unix)]
pub async fn reload_on_hangup(path: PathBuf, updates: mpsc::UnboundedSender<ServerConfig>) {
    use crate::config::watcher::reload;
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };

    while hangups.recv().await.is_some() {
        if updates.is_closed() {
            break;
        }
        tracing::info!(path = ?path, "SIGHUP received, reloading configuration");
        reload(&path, &updates);
    }
}

/// SIGHUP does not exist here; reloads come from the file watcher only.
#[cfg(not(unix))]
pub async fn reload_on_hangup(_path: PathBuf, _updates: mpsc::UnboundedSender<ServerConfig>) {}
