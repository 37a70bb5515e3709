//! Error taxonomy for the document engine.
//!
//! # Design Decisions
//! - One error enum for every library entry point so callers can match on the kind
//! - Conflicts are boxed: they carry a snapshot of the current value
//! - Validation and persistence failures wrap their subsystem errors

use serde::Serialize;
use thiserror::Error;

use crate::manager::ModifiableKind;
use crate::source::SourceError;
use crate::tree::{Node, NodeType};
use crate::validation::ValidationError;

/// Errors returned by the configuration manager and its components.
#[derive(Debug, Error)]
pub enum Error {
    /// No binding of this kind exists for the path.
    #[error("path `{path}` is not {kind}")]
    NotModifiable { kind: ModifiableKind, path: String },

    /// An array index outside the permitted range.
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A node holds a different variant than the caller asked for.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: NodeType, found: NodeType },

    /// An object member does not exist.
    #[error("key `{0}` not found")]
    NotFound(String),

    /// The node is not reachable from the document root.
    #[error("node is not reachable from the document root")]
    Disjoint,

    /// The same (kind, path) pair was registered twice.
    #[error("path `{path}` is already registered as {kind}")]
    AlreadyRegistered { kind: ModifiableKind, path: String },

    /// The staged copy of the document could not be edited at the path.
    #[error("could not edit staged document at `{path}`: {reason}")]
    PathEditFailed { path: String, reason: String },

    /// Custom, schema or external validation rejected the change.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The registered handler refused the change; it was rolled back.
    #[error("handler rejected change at `{path}`: {reason}")]
    HandlerRejected { path: String, reason: String },

    /// The source could not persist the document; the change was rolled back.
    #[error("failed to persist document: {0}")]
    PersistenceFailed(#[from] SourceError),

    /// The expected version did not match the live version.
    #[error(transparent)]
    Conflict(Box<ConflictError>),

    /// The query could not be parsed.
    #[error("invalid query `{query}`: {reason}")]
    QuerySyntax { query: String, reason: String },

    /// A direct key or index segment did not match the document.
    #[error("query traversal failed: {0}")]
    QueryTraversal(String),

    /// A query that must produce a result produced none.
    #[error("no results found for query `{0}`")]
    NoResults(String),

    /// A change handler called back into the manager that is notifying it.
    #[error("manager re-entered from a change handler")]
    Reentrant,

    /// The document or a value could not be interpreted.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl Error {
    /// Returns true for version conflicts, the only errors worth retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Conflict details, if this is a conflict.
    pub fn conflict(&self) -> Option<&ConflictError> {
        match self {
            Error::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

impl From<ConflictError> for Error {
    fn from(conflict: ConflictError) -> Self {
        Error::Conflict(Box::new(conflict))
    }
}

/// A mutation attempted against a stale version.
#[derive(Debug, Clone, Serialize, Error)]
#[error(
    "conflict: {operation} at {path} failed - version {expected_version} expected but current is {current_version}"
)]
pub struct ConflictError {
    /// Path the caller tried to modify.
    pub path: String,
    /// Operation name (insert, remove, replace, compare-and-swap).
    pub operation: String,
    /// Version the caller based its change on.
    pub expected_version: i64,
    /// Live version at the time of the check.
    pub current_version: i64,
    /// Value at `path` when it could be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Node>,
}

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, Error>;
