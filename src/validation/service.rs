//! External validation service client.
//!
//! # Responsibilities
//! - POST `{config, schema, context}` to a configured URL
//! - Bound each call by a timeout
//! - Translate non-200 statuses, transport failures and `valid: false`
//!   answers into `ValidationError::External`
//!
//! # Design Decisions
//! - Uses the blocking reqwest client: validation runs inside the manager's
//!   write lock, which is always taken off the async runtime

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::{ExternalValidator, ValidationError};

/// Default call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body sent to the validation service.
#[derive(Debug, Serialize)]
pub struct ValidationRequest<'a> {
    pub config: &'a Value,
    pub schema: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<&'a str>,
}

/// Answer expected from the validation service.
#[derive(Debug, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// HTTP client for a remote validator.
#[derive(Debug)]
pub struct ValidationService {
    url: String,
    headers: HashMap<String, String>,
    context: Option<String>,
    client: reqwest::blocking::Client,
}

impl ValidationService {
    /// Create a client. A zero timeout falls back to [`DEFAULT_TIMEOUT`].
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ValidationError> {
        let timeout = if timeout.is_zero() { DEFAULT_TIMEOUT } else { timeout };
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidationError::External(format!("failed to build client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            headers: HashMap::new(),
            context: None,
            client,
        })
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Free-form context string forwarded to the service.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ExternalValidator for ValidationService {
    fn validate(&self, document: &Value, schema: &Value) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::External(
                "validation service URL not configured".into(),
            ));
        }

        let body = ValidationRequest {
            config: document,
            schema,
            context: self.context.as_deref(),
        };

        let mut request = self.client.post(&self.url).json(&body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().map_err(|e| {
            tracing::warn!(url = %self.url, error = %e, "Validation service unreachable");
            ValidationError::External(format!("validation request failed: {}", e))
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let text = response.text().unwrap_or_default();
            return Err(ValidationError::External(format!(
                "validation service returned status {}: {}",
                status.as_u16(),
                text
            )));
        }

        let answer: ValidationResponse = response
            .json()
            .map_err(|e| ValidationError::External(format!("failed to decode response: {}", e)))?;

        if answer.valid {
            return Ok(());
        }
        if !answer.errors.is_empty() {
            return Err(ValidationError::External(answer.errors.join("; ")));
        }
        Err(ValidationError::External(
            answer.message.unwrap_or_else(|| "rejected".to_string()),
        ))
    }
}
