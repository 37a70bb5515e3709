//! HTTP interface subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (CORS, request ID, tracing, metrics, limits, timeout)
//!     → auth.rs (X-API-Key, skipped for /health)
//!     → handlers.rs (spawn_blocking → Manager)
//!         request.rs decodes POST bodies
//!     → response.rs (success envelope or mapped error)
//! ```

pub mod auth;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{ConfigOp, ConfigRequest};
pub use response::ApiError;
pub use server::{AppState, HttpServer, ServerError};
