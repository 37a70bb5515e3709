//! Live, schema-validated JSON configuration.
//!
//! A [`Manager`] owns a JSON document loaded from a [`source::Source`], exposes
//! it as an arena tree of nodes, and lets callers change only the paths that
//! were registered as insertable, removable or replaceable. Every change is
//! staged, validated, applied, offered to the registered handler and persisted
//! before it commits; any failure leaves the document, the version and the
//! registry untouched.
//!
//! ```text
//!   Source ──load──▶ Manager ──query──▶ QueryResult { path, node }
//!     ▲                 │
//!     └──set_config─────┤ insert / remove / replace / compare_and_swap
//!                       ▼
//!              change feed (broadcast) ──▶ subscribers
//! ```

// Document engine
pub mod error;
pub mod manager;
pub mod query;
pub mod tree;

// Collaborators
pub mod source;
pub mod validation;

// Service
pub mod http;
pub mod lifecycle;
pub mod settings;

// Cross-cutting concerns
pub mod observability;
pub mod resilience;

pub use error::{ConflictError, Error, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use manager::{
    ChangeEvent, DocumentState, Manager, ManagerBuilder, ModifiableKind, ModifiablePaths,
    Operation, Snapshot,
};
pub use query::QueryResult;
pub use settings::Settings;
pub use source::{FileSource, MemorySource, Source};
pub use tree::{Node, NodeId, NodeType};
