//! Settings schema definitions.
//!
//! All types derive Serde traits for deserialization from the settings file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resilience::RetryPolicy;

/// Root settings for the configuration service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// HTTP listener, authentication and limits.
    pub server: ServerSettings,

    /// The managed document and its modifiable paths.
    pub document: DocumentSettings,

    /// Optional external validation service.
    pub validation: ValidationSettings,

    /// Retry policy for optimistic updates.
    pub concurrency: RetryPolicy,

    /// Change history retention.
    pub history: HistorySettings,

    /// Logging and metrics.
    pub observability: ObservabilitySettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// API key required in `X-API-Key`. Empty disables authentication.
    pub api_key: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Optional TLS configuration.
    pub tls: Option<TlsSettings>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            api_key: String::new(),
            request_timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsSettings {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// The managed JSON document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocumentSettings {
    /// Path of the JSON document.
    pub path: String,

    /// Path of the JSON Schema. Empty means no schema.
    pub schema_path: String,

    /// Reload the document when the file changes on disk.
    pub watch: bool,

    /// Arrays open to insertion.
    pub insertable: Vec<String>,

    /// Arrays open to removal.
    pub removable: Vec<String>,

    /// Values open to replacement.
    pub replaceable: Vec<String>,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            path: "config.json".to_string(),
            schema_path: String::new(),
            watch: true,
            insertable: Vec::new(),
            removable: Vec::new(),
            replaceable: Vec::new(),
        }
    }
}

/// External validation service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Service URL. Empty disables external validation.
    pub service_url: String,

    /// Request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            timeout_ms: 10_000,
            headers: BTreeMap::new(),
        }
    }
}

/// Change history retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Events kept before the oldest is evicted.
    pub capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: crate::manager::history::DEFAULT_CAPACITY,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
