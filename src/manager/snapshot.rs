//! Whole-document snapshots, restore, and reload from the source.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::manager::history::{unix_now, ChangeEvent, Operation};
use crate::manager::{Manager, State};
use crate::observability::metrics;
use crate::tree::{path, Node};

/// A point-in-time copy of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: i64,
    /// Seconds since the Unix epoch.
    pub taken_at: u64,
    pub document: Node,
}

impl Manager {
    /// Copy of the document together with its version.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.ensure_not_notifying()?;
        let state = self.state.read();
        let document = state.tree.to_node(state.tree.root()).ok_or(Error::Disjoint)?;
        Ok(Snapshot {
            version: self.version(),
            taken_at: unix_now(),
            document,
        })
    }

    /// Replace the whole document with `snapshot`. The document is validated
    /// and persisted first; bindings are re-attached by path and the version
    /// moves forward by one.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<i64> {
        self.ensure_not_notifying()?;
        let outcome = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let document = snapshot.document.to_value();
            self.validate_document(&document)
                .and_then(|()| self.source.set_config(document).map_err(Error::from))
                .map(|()| self.rebuild(state, &snapshot.document, Operation::Restore))
        };
        self.conclude(Operation::Restore, outcome)
    }

    /// Adopt a document changed behind the manager's back (hot reload).
    /// Returns the new version, or `None` when the source is unchanged.
    pub fn reload(&self) -> Result<Option<i64>> {
        self.ensure_not_notifying()?;
        let outcome = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let candidate = match self.source.refresh() {
                Ok(Some(candidate)) => candidate,
                Ok(None) => return Ok(None),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not re-read configuration source");
                    return Err(e.into());
                }
            };
            let document = Node::from(&candidate);
            self.validate_document(&candidate)
                .and_then(|()| self.source.set_config(candidate).map_err(Error::from))
                .map(|()| self.rebuild(state, &document, Operation::Reload))
        };
        self.conclude(Operation::Reload, outcome).map(Some)
    }

    fn rebuild(&self, state: &mut State, document: &Node, op: Operation) -> ChangeEvent {
        state.tree.reset(document);
        let version = self.version.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        state.cache.get_mut().invalidate();
        let dropped = state.registry.rebind(&state.tree);
        if dropped > 0 {
            tracing::info!(dropped, op = %op, "Dropped bindings whose path no longer fits");
        }
        metrics::record_version(version);

        let mut event = ChangeEvent::new(op, path::ROOT, version);
        event.new_value = Some(document.clone());
        state.history.record(event.clone());
        tracing::info!(op = %op, version, "Document replaced");
        event
    }

    fn conclude(&self, op: Operation, outcome: Result<ChangeEvent>) -> Result<i64> {
        let result = outcome.map(|event| {
            let version = event.version;
            self.publish(event);
            version
        });
        if let Err(e) = &result {
            tracing::warn!(op = %op, error = %e, "Document replacement rejected");
        }
        metrics::record_mutation(op, metrics::outcome_label(&result));
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn test_snapshot_and_restore() {
        let m = Manager::new(Arc::new(MemorySource::new(r#"{"items": [1, 2]}"#, "").unwrap())).unwrap();
        m.register_insert("/items", |_| Ok(())).unwrap();

        let snapshot = m.snapshot().unwrap();
        m.insert("/items", 2, 3).unwrap();
        assert_eq!(m.version(), 2);

        assert_eq!(m.restore(&snapshot).unwrap(), 3);
        assert_eq!(m.document().unwrap(), snapshot.document);
        assert_eq!(m.source().config_object()["items"], serde_json::json!([1, 2]));

        // The binding follows the path into the rebuilt tree.
        m.insert("/items", 0, 0).unwrap();
        assert_eq!(m.get("/items").unwrap().to_value(), serde_json::json!([0, 1, 2]));
    }

    #[test]
    fn test_restore_rejects_invalid_snapshot() {
        let schema = r#"{"properties": {"items": {"type": "array"}}}"#;
        let m = Manager::new(Arc::new(MemorySource::new(r#"{"items": []}"#, schema).unwrap())).unwrap();
        let bad = Snapshot {
            version: 1,
            taken_at: 0,
            document: serde_json::json!({"items": "nope"}).into(),
        };
        assert!(matches!(m.restore(&bad), Err(Error::Validation(_))));
        assert_eq!(m.version(), 1);
    }

    #[test]
    fn test_reload_without_changes() {
        let m = Manager::new(Arc::new(MemorySource::new(r#"{"a": 1}"#, "").unwrap())).unwrap();
        assert_eq!(m.reload().unwrap(), None);
        assert_eq!(m.version(), 1);
    }
}
