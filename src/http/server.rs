//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the `/config`, `/query` and `/health` handlers
//! - Wire up middleware (CORS, request ID, tracing, metrics, limits, timeout)
//! - Serve plain TCP or TLS with graceful shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderName, Method},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::auth::{self, API_KEY_HEADER};
use crate::http::handlers;
use crate::manager::Manager;
use crate::observability::metrics;
use crate::settings::{ServerSettings, TlsSettings};

/// Grace period for in-flight TLS connections on shutdown.
const TLS_DRAIN: Duration = Duration::from_secs(10);

/// Errors from binding and serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(std::io::Error),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
    /// SHA-256 of the configured API key, if any.
    pub api_key: Option<[u8; 32]>,
}

impl AppState {
    /// An empty `api_key` disables authentication.
    pub fn new(manager: Arc<Manager>, api_key: &str) -> Self {
        Self {
            manager,
            api_key: (!api_key.is_empty()).then(|| auth::digest(api_key)),
        }
    }
}

/// HTTP front end of a [`Manager`].
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(manager: Arc<Manager>, settings: &ServerSettings) -> Self {
        let state = AppState::new(manager, &settings.api_key);
        Self {
            router: Self::build_router(state, settings),
        }
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, settings: &ServerSettings) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static(API_KEY_HEADER),
            ])
            .max_age(Duration::from_secs(3600));

        let protected = Router::new()
            .route("/config", get(handlers::get_config).post(handlers::post_config))
            .route("/query", get(handlers::run_query))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_api_key,
            ));

        Router::new()
            .merge(protected)
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(DefaultBodyLimit::max(settings.max_body_bytes))
            .layer(RequestBodyLimitLayer::new(settings.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(settings.request_timeout_secs)))
            .layer(middleware::from_fn(track_metrics))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(cors)
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve TLS on `addr` until `shutdown` resolves.
    pub async fn run_tls<F>(self, addr: SocketAddr, tls: &TlsSettings, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))
            .await
            .map_err(ServerError::Tls)?;

        let handle = axum_server::Handle::new();
        let draining = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            draining.graceful_shutdown(Some(TLS_DRAIN));
        });

        tracing::info!(address = %addr, "HTTPS server starting");
        axum_server::bind_rustls(addr, config)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Bind a TCP listener.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, std::io::Error> {
    for (what, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} file not found: {:?}", what, path),
            ));
        }
    }
    RustlsConfig::from_pem_file(cert_path, key_path).await
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_http_request(&method, response.status().as_u16());
    response
}
