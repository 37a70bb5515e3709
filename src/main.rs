//! live-config service.
//!
//! Serves one JSON document over HTTP and keeps it in sync with its file.
//!
//! ```text
//!   settings.toml ──▶ Settings
//!                        │
//!   document.json ──▶ FileSource ──▶ Manager ◀── spawn_blocking ── HttpServer ◀── clients
//!        ▲                              ▲
//!        └── notify ── SourceWatcher ───┘ reload (also on SIGHUP)
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use live_config::http::server;
use live_config::lifecycle::signals;
use live_config::manager::{Handler, ModifiableKind};
use live_config::observability::{logging, metrics};
use live_config::settings::{load_settings, Settings};
use live_config::source::{FileSource, SourceError, SourceWatcher};
use live_config::validation::{ValidationError, ValidationService};
use live_config::{HttpServer, Manager, Node, Shutdown};

#[derive(Parser)]
#[command(name = "live-config")]
#[command(about = "Serve a live, schema-validated JSON configuration", long_about = None)]
struct Args {
    /// Settings file (TOML). Defaults apply when it does not exist.
    #[arg(short, long, default_value = "live-config.toml")]
    settings: PathBuf,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to load document: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Manager(#[from] live_config::Error),

    #[error("external validation: {0}")]
    Validation(#[from] ValidationError),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let found = args.settings.exists();
    let settings = if found {
        load_settings(&args.settings)?
    } else {
        Settings::default()
    };

    logging::init(&settings.observability.log_level, settings.observability.json_logs);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "live-config starting");
    if !found {
        tracing::warn!(path = ?args.settings, "Settings file not found, using defaults");
    }

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind: SocketAddr = settings.server.bind_address.parse()?;

    // The manager may own a blocking HTTP client, which must be built and
    // dropped off the async runtime.
    let startup = settings.clone();
    let manager = Arc::new(tokio::task::spawn_blocking(move || build_manager(&startup)).await??);
    tracing::info!(
        document = %settings.document.path,
        version = manager.version(),
        "Document loaded"
    );

    let outcome = serve(&settings, bind, Arc::clone(&manager)).await;
    tokio::task::spawn_blocking(move || drop(manager)).await?;
    outcome?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Run the reload loop and the HTTP server until shutdown. Every task holding
/// the manager has finished when this returns.
async fn serve(
    settings: &Settings,
    bind: SocketAddr,
    manager: Arc<Manager>,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = Arc::new(Shutdown::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            signals::shutdown_signal().await;
            shutdown.trigger();
        });
    }

    let reloader = if settings.document.watch {
        let (watcher, mut changes) = SourceWatcher::new(Path::new(&settings.document.path));
        tokio::spawn(signals::forward_reload_signals(watcher.sender()));
        let guard = watcher.run()?;
        let manager = Arc::clone(&manager);
        let mut stop = shutdown.subscribe();
        Some(tokio::spawn(async move {
            let _guard = guard;
            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    Some(()) = changes.recv() => reload(&manager).await,
                }
            }
        }))
    } else {
        None
    };

    let http = HttpServer::new(manager, &settings.server);
    let served = match &settings.server.tls {
        Some(tls) => http.run_tls(bind, tls, shutdown.signalled()).await,
        None => match server::bind(&settings.server.bind_address).await {
            Ok(listener) => http.run(listener, shutdown.signalled()).await,
            Err(e) => Err(e),
        },
    };

    shutdown.trigger();
    if let Some(task) = reloader {
        task.await?;
    }
    served.map_err(Into::into)
}

/// Build the manager and register the modifiable paths from the settings.
fn build_manager(settings: &Settings) -> Result<Manager, StartupError> {
    let document = &settings.document;
    let source = if document.schema_path.is_empty() {
        FileSource::new(&document.path, "")?
    } else {
        FileSource::with_schema_file(&document.path, Path::new(&document.schema_path))?
    };

    let mut builder = Manager::builder(Arc::new(source))
        .retry_policy(settings.concurrency)
        .history_capacity(settings.history.capacity);

    let validation = &settings.validation;
    if !validation.service_url.is_empty() {
        let mut service =
            ValidationService::new(&validation.service_url, Duration::from_millis(validation.timeout_ms))?;
        for (name, value) in &validation.headers {
            service = service.with_header(name, value);
        }
        tracing::info!(url = %service.url(), "External validation enabled");
        builder = builder.external_validator(Arc::new(service));
    }

    let manager = builder.build()?;
    for (kind, paths) in [
        (ModifiableKind::Insertable, &document.insertable),
        (ModifiableKind::Removable, &document.removable),
        (ModifiableKind::Replaceable, &document.replaceable),
    ] {
        for at in paths {
            manager.register_path(kind, at, logging_handler(kind, at))?;
            tracing::info!(path = %at, kind = %kind, "Registered modifiable path");
        }
    }
    Ok(manager)
}

fn logging_handler(kind: ModifiableKind, at: &str) -> Handler {
    let at = at.to_string();
    Arc::new(move |node: &Node| {
        tracing::info!(path = %at, kind = %kind, value = %node, "Change accepted");
        Ok(())
    })
}

async fn reload(manager: &Arc<Manager>) {
    let manager = Arc::clone(manager);
    match tokio::task::spawn_blocking(move || manager.reload()).await {
        Ok(Ok(Some(version))) => tracing::info!(version, "Document reloaded from disk"),
        Ok(Ok(None)) => tracing::debug!("Document unchanged on disk"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Reload rejected, keeping current document"),
        Err(e) => tracing::error!(error = %e, "Reload task failed"),
    }
}
