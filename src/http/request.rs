//! Parsing and checking of `POST /config` bodies.
//!
//! # Responsibilities
//! - Decode `{op, path, index?, value?, version?}`
//! - Report the first malformed field with a message naming it
//! - Dispatch the operation to the manager, conditionally when a version is given
//!
//! # Design Decisions
//! - A present `value` key counts even when it is `null`, so values can be nulled
//! - Integral floats are accepted as indices (`1.0` is index 1)

use serde_json::{Map, Value};

use crate::error::Result;
use crate::manager::Manager;
use crate::tree::Node;

/// The operation carried by a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOp {
    Insert { index: usize, value: Node },
    Remove { index: usize },
    Replace { value: Node },
}

/// A decoded `POST /config` body.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRequest {
    pub path: String,
    pub op: ConfigOp,
    /// Makes the operation conditional on this version.
    pub version: Option<i64>,
}

impl ConfigRequest {
    /// Decode a raw body.
    pub fn parse(body: &[u8]) -> std::result::Result<Self, String> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err("request body is empty".to_string());
        }
        let value: Value =
            serde_json::from_slice(body).map_err(|e| format!("invalid JSON: {}", e))?;
        Self::from_value(&value)
    }

    /// Decode an already parsed body.
    pub fn from_value(body: &Value) -> std::result::Result<Self, String> {
        let body = body
            .as_object()
            .ok_or_else(|| "request body must be a JSON object".to_string())?;

        let op = required_str(body, "op")?;
        let path = required_str(body, "path")?;
        if !path.starts_with('/') {
            return Err("path must start with '/'".to_string());
        }

        let op = match op {
            "insert" => ConfigOp::Insert {
                index: index(body)?,
                value: value(body)?,
            },
            "remove" => ConfigOp::Remove { index: index(body)? },
            "replace" => ConfigOp::Replace { value: value(body)? },
            other => return Err(format!("unsupported operation: {}", other)),
        };

        let version = match body.get("version") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_i64().ok_or_else(|| "version must be a number".to_string())?),
        };

        Ok(Self {
            path: path.to_string(),
            op,
            version,
        })
    }

    /// Run the request against `manager`. Returns the new version.
    pub fn apply(self, manager: &Manager) -> Result<i64> {
        let at = self.path.as_str();
        match (self.op, self.version) {
            (ConfigOp::Insert { index, value }, None) => manager.insert(at, index, value),
            (ConfigOp::Insert { index, value }, Some(v)) => {
                manager.conditional_insert(at, index, value, v)
            }
            (ConfigOp::Remove { index }, None) => manager.remove(at, index),
            (ConfigOp::Remove { index }, Some(v)) => manager.conditional_remove(at, index, v),
            (ConfigOp::Replace { value }, None) => manager.replace(at, value),
            (ConfigOp::Replace { value }, Some(v)) => manager.conditional_replace(at, value, v),
        }
    }
}

fn required_str<'a>(body: &'a Map<String, Value>, field: &str) -> std::result::Result<&'a str, String> {
    match body.get(field) {
        None | Some(Value::Null) => Err(format!("'{}' is missing", field)),
        Some(Value::String(s)) if s.is_empty() => Err(format!("'{}' cannot be empty", field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(format!("'{}' must be a string", field)),
    }
}

fn index(body: &Map<String, Value>) -> std::result::Result<usize, String> {
    let number = match body.get("index") {
        None | Some(Value::Null) => return Err("'index' is missing".to_string()),
        Some(Value::Number(n)) => n,
        Some(_) => return Err("'index' must be a number".to_string()),
    };
    if let Some(i) = number.as_u64() {
        return usize::try_from(i).map_err(|_| "'index' is too large".to_string());
    }
    match number.as_f64() {
        Some(f) if f < 0.0 => Err("'index' must be non-negative".to_string()),
        Some(f) if f.fract() == 0.0 && f <= usize::MAX as f64 => Ok(f as usize),
        _ => Err("'index' must be an integer".to_string()),
    }
}

fn value(body: &Map<String, Value>) -> std::result::Result<Node, String> {
    body.get("value")
        .map(Node::from)
        .ok_or_else(|| "value is required for insert/replace".to_string())
}
