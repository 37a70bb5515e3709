//! In-memory source backed by a string.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;

use crate::source::{Loaded, Source, SourceError};

/// A source that keeps the document in memory only.
#[derive(Debug)]
pub struct MemorySource {
    current: ArcSwap<Loaded>,
    schema: String,
}

impl MemorySource {
    /// Parse `config` as JSON; `schema` may be empty.
    pub fn new(config: &str, schema: impl Into<String>) -> Result<Self, SourceError> {
        if config.trim().is_empty() {
            return Err(SourceError::Rejected("config cannot be empty".into()));
        }
        let document: Value = serde_json::from_str(config)?;
        Ok(Self {
            current: ArcSwap::from_pointee(Loaded::new(document, config.to_string())),
            schema: schema.into(),
        })
    }

    /// Build from an already parsed document.
    pub fn from_value(document: Value, schema: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            current: ArcSwap::from_pointee(Loaded::render(document)?),
            schema: schema.into(),
        })
    }
}

impl Source for MemorySource {
    fn config_object(&self) -> Arc<Value> {
        self.current.load().document.clone()
    }

    fn config(&self) -> String {
        self.current.load().text.clone()
    }

    fn schema(&self) -> String {
        self.schema.clone()
    }

    fn set_config(&self, document: Value) -> Result<(), SourceError> {
        self.current.store(Arc::new(Loaded::render(document)?));
        Ok(())
    }
}
