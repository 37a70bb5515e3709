//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM/SIGINT and report them as a shutdown request
//! - Forward SIGHUP as a document reload request
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed is logged and never fires

use tokio::sync::mpsc;

/// Resolve on Ctrl+C or SIGTERM.
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
    tracing::info!("Shutdown signal received");
}

/// Send one `()` on `reload` per SIGHUP until the receiver is dropped.
#[cfg(unix)]
pub async fn forward_reload_signals(reload: mpsc::UnboundedSender<()>) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        tracing::info!("SIGHUP received, reloading document");
        if reload.send(()).is_err() {
            break;
        }
    }
}

#[cfg(not(unix))]
pub async fn forward_reload_signals(_reload: mpsc::UnboundedSender<()>) {}
