//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → trigger() → server drains, watcher loop exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Reload the document from its source
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
