//! Configuration sources.
//!
//! # Data Flow
//! ```text
//! startup:
//!     Source::config_object() → Tree built by the manager
//!     Source::config() + Source::schema() → initial schema check
//!
//! every committed mutation:
//!     manager stages an edited clone → Source::set_config(staged)
//!
//! hot reload (file sources):
//!     watcher.rs signals a change → Manager::reload()
//!     → Source::refresh() returns the new document → validated → adopted
//! ```
//!
//! # Design Decisions
//! - Sources hold the document behind `ArcSwap`; reads never block
//! - `set_config` is atomic from the caller's view (file sources write a
//!   temporary file and rename it over the target)
//! - `refresh` never adopts a document on its own; the manager validates first

pub mod file;
pub mod memory;
pub mod watcher;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub use file::FileSource;
pub use memory::MemorySource;
pub use watcher::SourceWatcher;

/// Errors raised by configuration sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("source rejected document: {0}")]
    Rejected(String),
}

/// Backing store for the configuration document.
///
/// Implementations must be safe for concurrent reads.
pub trait Source: Send + Sync {
    /// Current document; callers clone it to stage edits.
    fn config_object(&self) -> Arc<Value>;

    /// Canonical string form of the current document.
    fn config(&self) -> String;

    /// JSON schema the document must satisfy. Empty means no constraints.
    fn schema(&self) -> String;

    /// Replace the stored document.
    fn set_config(&self, document: Value) -> Result<(), SourceError>;

    /// Re-read the backing store. Returns the new document if it differs from
    /// the current one, without adopting it.
    fn refresh(&self) -> Result<Option<Value>, SourceError> {
        Ok(None)
    }
}

/// Stored document together with its canonical text.
#[derive(Debug)]
pub(crate) struct Loaded {
    pub(crate) document: Arc<Value>,
    pub(crate) text: String,
}

impl Loaded {
    pub(crate) fn new(document: Value, text: String) -> Self {
        Self {
            document: Arc::new(document),
            text,
        }
    }

    pub(crate) fn render(document: Value) -> Result<Self, SourceError> {
        let text = serde_json::to_string_pretty(&document)?;
        Ok(Self::new(document, text))
    }
}
