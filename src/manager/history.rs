//! Bounded log of committed changes.

use std::collections::VecDeque;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::tree::Node;

/// Default number of events retained.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Kind of committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Remove,
    Replace,
    Restore,
    Reload,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Remove => "remove",
            Operation::Replace => "replace",
            Operation::Restore => "restore",
            Operation::Reload => "reload",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub operation: Operation,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Node>,
    /// Version produced by this change.
    pub version: i64,
}

impl ChangeEvent {
    pub fn new(operation: Operation, path: impl Into<String>, version: i64) -> Self {
        Self {
            timestamp: unix_now(),
            operation,
            path: path.into(),
            index: None,
            old_value: None,
            new_value: None,
            version,
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Ring buffer of change events, oldest evicted first.
#[derive(Debug, Clone)]
pub struct ChangeHistory {
    events: VecDeque<ChangeEvent>,
    capacity: usize,
}

impl Default for ChangeHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeHistory {
    /// A zero capacity falls back to [`DEFAULT_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        Self {
            events: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn record(&mut self, event: ChangeEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Every retained event, oldest first.
    pub fn all(&self) -> Vec<ChangeEvent> {
        self.events.iter().cloned().collect()
    }

    /// The `limit` newest events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ChangeEvent> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Up to `limit` events for `path`, newest first.
    pub fn by_path(&self, path: &str, limit: usize) -> Vec<ChangeEvent> {
        self.events
            .iter()
            .rev()
            .filter(|event| event.path == path)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Pretty-printed JSON array, oldest first.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}
