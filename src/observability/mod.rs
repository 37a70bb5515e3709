//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and the version gauge)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (binary only)
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the HTTP layer into every request span
//! - Metrics are cheap (atomic increments) and safe to record under the write lock

pub mod logging;
pub mod metrics;
