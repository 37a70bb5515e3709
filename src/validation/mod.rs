//! Validation subsystem.
//!
//! # Data Flow
//! ```text
//! staged change at path P:
//!     → custom.rs (validators registered for P, first failure wins)
//!     → schema.rs (whole staged document against the JSON schema)
//!     → service.rs (optional external HTTP validator, bounded by timeout)
//!     → accepted: manager applies the change to the live tree
//! ```
//!
//! # Design Decisions
//! - Validation runs before any in-memory mutation; a rejection has no side effects
//! - Schema violations are collected in full, then reported as one error
//! - An unreachable or timed-out external validator counts as a rejection

pub mod custom;
pub mod schema;
pub mod service;

use serde_json::Value;
use thiserror::Error;

pub use custom::{CustomValidators, ValidatorFn};
pub use schema::SchemaValidator;
pub use service::ValidationService;

/// Reasons a staged document was rejected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// A custom validator registered for `path` failed.
    #[error("validation failed at {path}: {message}")]
    Custom { path: String, message: String },

    /// The staged document violates the schema.
    #[error("schema validation failed: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// The external validation service rejected the document or was unreachable.
    #[error("external validation failed: {0}")]
    External(String),
}

/// A validator consulted after schema validation, typically a remote service.
pub trait ExternalValidator: Send + Sync {
    /// Validate the full staged document.
    fn validate(&self, document: &Value, schema: &Value) -> Result<(), ValidationError>;
}
