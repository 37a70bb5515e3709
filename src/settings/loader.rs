//! Settings loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::settings::schema::Settings;
use crate::settings::validation::{validate_settings, SettingsIssue};

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<SettingsIssue>),
}

fn join(issues: &[SettingsIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate settings from TOML text.
pub fn parse_settings(content: &str) -> Result<Settings, SettingsError> {
    let settings: Settings = toml::from_str(content)?;
    validate_settings(&settings).map_err(SettingsError::Validation)?;
    Ok(settings)
}

/// Load and validate settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path)?;
    parse_settings(&content)
}
