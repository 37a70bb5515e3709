//! File-backed source.
//!
//! # Responsibilities
//! - Load the document (and optionally the schema) from disk
//! - Persist by writing a temporary sibling file and renaming it into place
//! - Re-read the file on demand for hot reload

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::source::{Loaded, Source, SourceError};

/// A source persisted as a JSON file.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    schema: String,
    current: ArcSwap<Loaded>,
    /// Serializes writes against hot-reload reads of the same file.
    io: Mutex<()>,
}

impl FileSource {
    /// Load `path`; `schema` is the schema text (may be empty).
    pub fn new(path: impl Into<PathBuf>, schema: impl Into<String>) -> Result<Self, SourceError> {
        let path = path.into();
        let text = fs::read_to_string(&path)?;
        let document: Value = serde_json::from_str(&text)?;

        tracing::info!(path = %path.display(), "Loaded configuration document");

        Ok(Self {
            path,
            schema: schema.into(),
            current: ArcSwap::from_pointee(Loaded::new(document, text)),
            io: Mutex::new(()),
        })
    }

    /// Load the document and read the schema from a second file.
    pub fn with_schema_file(
        path: impl Into<PathBuf>,
        schema_path: &Path,
    ) -> Result<Self, SourceError> {
        let schema = fs::read_to_string(schema_path)?;
        Self::new(path, schema)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    fn write_atomically(&self, text: &str) -> Result<(), SourceError> {
        let temp = self.temp_path();
        let mut file = fs::File::create(&temp)?;
        file.write_all(text.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl Source for FileSource {
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
        let loaded = Loaded::render(document)?;
        let _io = self.io.lock();
        self.write_atomically(&loaded.text)?;
        self.current.store(Arc::new(loaded));
        tracing::debug!(path = %self.path.display(), "Configuration document written");
        Ok(())
    }

    fn refresh(&self) -> Result<Option<Value>, SourceError> {
        let _io = self.io.lock();
        let text = fs::read_to_string(&self.path)?;
        let document: Value = serde_json::from_str(&text)?;
        if document == *self.current.load().document {
            return Ok(None);
        }
        Ok(Some(document))
    }
}
