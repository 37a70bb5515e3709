//! Service settings subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Settings (validated, immutable)
//!     → consumed once by the binary at startup
//! ```
//!
//! # Design Decisions
//! - Every field has a default so an empty file is a valid configuration
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_settings, SettingsError};
pub use schema::{
    DocumentSettings, HistorySettings, ObservabilitySettings, ServerSettings, Settings,
    TlsSettings, ValidationSettings,
};
pub use validation::{validate_settings, SettingsIssue};
