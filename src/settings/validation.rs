//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses, URLs and value ranges
//! - Check that modifiable paths are well formed
//!
//! # Design Decisions
//! - Returns all issues, not just the first
//! - Pure function: `&Settings → Result<(), Vec<SettingsIssue>>`

use std::fmt;
use std::net::SocketAddr;

use crate::settings::schema::Settings;

/// One semantic problem in the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsIssue {
    /// Dotted location of the offending field.
    pub field: String,
    pub message: String,
}

impl SettingsIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SettingsIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check everything serde cannot.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<SettingsIssue>> {
    let mut issues = Vec::new();

    let server = &settings.server;
    if server.bind_address.parse::<SocketAddr>().is_err() {
        issues.push(SettingsIssue::new(
            "server.bind_address",
            format!("`{}` is not a socket address", server.bind_address),
        ));
    }
    if server.request_timeout_secs == 0 {
        issues.push(SettingsIssue::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if server.max_body_bytes == 0 {
        issues.push(SettingsIssue::new("server.max_body_bytes", "must be greater than 0"));
    }
    if let Some(tls) = &server.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            issues.push(SettingsIssue::new("server.tls", "cert_path and key_path are both required"));
        }
    }

    let document = &settings.document;
    if document.path.trim().is_empty() {
        issues.push(SettingsIssue::new("document.path", "must not be empty"));
    }
    for (field, paths) in [
        ("document.insertable", &document.insertable),
        ("document.removable", &document.removable),
        ("document.replaceable", &document.replaceable),
    ] {
        for p in paths.iter().filter(|p| !p.starts_with('/')) {
            issues.push(SettingsIssue::new(field, format!("`{}` must start with '/'", p)));
        }
    }

    let validation = &settings.validation;
    if !validation.service_url.is_empty() {
        match url::Url::parse(&validation.service_url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => issues.push(SettingsIssue::new(
                "validation.service_url",
                format!("unsupported scheme `{}`", u.scheme()),
            )),
            Err(e) => issues.push(SettingsIssue::new("validation.service_url", e.to_string())),
        }
    }

    let retry = &settings.concurrency;
    if retry.max_attempts == 0 {
        issues.push(SettingsIssue::new("concurrency.max_attempts", "must be at least 1"));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        issues.push(SettingsIssue::new(
            "concurrency.base_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }

    let observability = &settings.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        issues.push(SettingsIssue::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", observability.metrics_address),
        ));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
