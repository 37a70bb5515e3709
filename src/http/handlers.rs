//! Route handlers.
//!
//! Manager calls take a blocking lock and may run user handlers or the
//! external validation client, so they go through `spawn_blocking`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::http::request::ConfigRequest;
use crate::http::response::{self, ApiError};
use crate::http::server::AppState;

/// Run a manager call off the async workers.
async fn blocking<T, F>(call: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ApiError::internal(format!("task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// `GET /config`: modifiable paths, document, schema and version.
pub async fn get_config(State(state): State<AppState>) -> std::result::Result<Response, ApiError> {
    let manager = Arc::clone(&state.manager);
    let described = blocking(move || manager.describe()).await?;
    Ok(response::ok(described))
}

/// `POST /config`: apply one insert, remove or replace.
pub async fn post_config(
    State(state): State<AppState>,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let request = ConfigRequest::parse(&body).map_err(ApiError::bad_request)?;
    tracing::debug!(path = %request.path, version = ?request.version, "Config change requested");

    let manager = Arc::clone(&state.manager);
    let described = blocking(move || {
        request.apply(&manager)?;
        manager.describe()
    })
    .await?;
    Ok(response::ok(described))
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub q: String,
}

/// `GET /query?q=...`: matching paths and values.
pub async fn run_query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> std::result::Result<Response, ApiError> {
    let manager = Arc::clone(&state.manager);
    let results = blocking(move || manager.query(&params.q)).await?;
    Ok(response::ok(results))
}

/// `GET /health`.
pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}
