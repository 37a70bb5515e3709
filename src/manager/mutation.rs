//! Insert, remove and replace: the five-phase mutation protocol.
//!
//! # Responsibilities
//! - Resolve the binding and bounds, stage and validate the change
//! - Apply it to the live tree with a backup, notify the handler
//! - Persist, then commit (version, path cache, registry, history)
//! - Roll the live tree back when the handler or the source refuses
//!
//! # Design Decisions
//! - Phases 1-3 have no side effects; a failure there leaves everything untouched
//! - Detached subtrees are freed only after persistence succeeds, so a
//!   rollback can splice the original node ids back in

use serde_json::Value;

use crate::error::{Error, Result};
use crate::manager::history::{ChangeEvent, Operation};
use crate::manager::registry::ModifiableKind;
use crate::manager::{staging, Manager, State};
use crate::observability::metrics;
use crate::tree::{path, Content, Node, NodeId, NodeType, Tree};

/// A requested change at a registered path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Edit {
    Insert { index: usize, value: Node },
    Remove { index: usize },
    Replace { value: Node },
}

impl Edit {
    pub(crate) fn operation(&self) -> Operation {
        match self {
            Edit::Insert { .. } => Operation::Insert,
            Edit::Remove { .. } => Operation::Remove,
            Edit::Replace { .. } => Operation::Replace,
        }
    }

    fn kind(&self) -> ModifiableKind {
        match self {
            Edit::Insert { .. } => ModifiableKind::Insertable,
            Edit::Remove { .. } => ModifiableKind::Removable,
            Edit::Replace { .. } => ModifiableKind::Replaceable,
        }
    }

    fn index(&self) -> Option<usize> {
        match self {
            Edit::Insert { index, .. } | Edit::Remove { index } => Some(*index),
            Edit::Replace { .. } => None,
        }
    }
}

/// A change applied to the live tree that has not been committed yet.
enum Applied {
    Inserted { array: NodeId, index: usize, child: NodeId },
    Removed { array: NodeId, index: usize, child: NodeId },
    Replaced { node: NodeId, previous: Content },
}

impl Applied {
    /// Undo the change, freeing anything it allocated.
    fn rollback(self, tree: &mut Tree) {
        match self {
            Applied::Inserted { array, index, child } => {
                if let Some(detached) = tree.array_remove(array, index) {
                    debug_assert_eq!(detached, child);
                    tree.free_subtree(detached);
                }
            }
            Applied::Removed { array, index, child } => {
                tree.array_insert(array, index, child);
            }
            Applied::Replaced { node, previous } => {
                if let Some(current) = tree.replace_content(node, previous) {
                    tree.free_children(&current);
                }
            }
        }
    }

    /// Release whatever the change detached.
    fn finish(self, tree: &mut Tree) {
        match self {
            Applied::Inserted { .. } => {}
            Applied::Removed { child, .. } => tree.free_subtree(child),
            Applied::Replaced { previous, .. } => tree.free_children(&previous),
        }
    }
}

impl Manager {
    /// Insert `value` before `index` in the insertable array at `path`.
    /// `index == len` appends. Returns the new version.
    pub fn insert(&self, at: &str, index: usize, value: impl Into<Node>) -> Result<i64> {
        self.mutate(
            at,
            None,
            Edit::Insert {
                index,
                value: value.into(),
            },
        )
    }

    /// Remove the element at `index` from the removable array at `path`.
    pub fn remove(&self, at: &str, index: usize) -> Result<i64> {
        self.mutate(at, None, Edit::Remove { index })
    }

    /// Replace the value at the replaceable `path`.
    pub fn replace(&self, at: &str, value: impl Into<Node>) -> Result<i64> {
        self.mutate(
            at,
            None,
            Edit::Replace {
                value: value.into(),
            },
        )
    }

    /// Run the protocol under one write-lock acquisition, optionally checking
    /// `expected` against the live version first.
    pub(crate) fn mutate(&self, at: &str, expected: Option<i64>, edit: Edit) -> Result<i64> {
        self.ensure_not_notifying()?;
        let at = path::normalize(at);
        let op = edit.operation();

        let outcome = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            match expected {
                Some(expected) => self
                    .check_version(state, &at, op, expected)
                    .and_then(|()| self.apply(state, &at, edit)),
                None => self.apply(state, &at, edit),
            }
        };

        let result = outcome.map(|event| {
            let version = event.version;
            self.publish(event);
            version
        });
        metrics::record_mutation(op, metrics::outcome_label(&result));
        result
    }

    /// Phases 1 to 5 for one edit. The caller holds the write lock.
    fn apply(&self, state: &mut State, at: &str, edit: Edit) -> Result<ChangeEvent> {
        let op = edit.operation();
        let kind = edit.kind();

        // 1. resolve
        let entry = state
            .registry
            .find(kind, at)
            .ok_or_else(|| Error::NotModifiable {
                kind,
                path: at.to_string(),
            })?;
        let target = entry.node;
        let handler = entry.handler.clone();

        let found = state.tree.node_type(target).ok_or(Error::Disjoint)?;
        if let Some(index) = edit.index() {
            let len = state.tree.array_len(target).ok_or(Error::TypeMismatch {
                expected: NodeType::Array,
                found,
            })?;
            let in_bounds = match edit {
                Edit::Insert { .. } => index <= len,
                _ => index < len,
            };
            if !in_bounds {
                return Err(Error::IndexOutOfBounds { index, len });
            }
        }
        tracing::debug!(op = %op, path = %at, "Resolved mutation target");

        // 2. stage
        let mut staged: Value = (*self.source.config_object()).clone();
        match &edit {
            Edit::Insert { index, value } => {
                staging::insert(&mut staged, at, *index, value.to_value())?;
            }
            Edit::Remove { index } => {
                staging::remove(&mut staged, at, *index)?;
            }
            Edit::Replace { value } => {
                staging::replace(&mut staged, at, value.to_value())?;
            }
        }
        let staged_at = Node::from(&*staging::locate_mut(&mut staged, at)?);

        // 3. validate
        let current = state.tree.to_node(target);
        let custom = self.in_callback(|| state.validators.validate(at, current.as_ref(), &staged_at));
        if let Err(e) = custom {
            tracing::warn!(op = %op, path = %at, error = %e, "Custom validation rejected change");
            return Err(e.into());
        }
        if let Err(e) = self.validate_document(&staged) {
            tracing::warn!(op = %op, path = %at, error = %e, "Validation rejected change");
            return Err(e);
        }

        // 4. mutate + notify
        let mut event = ChangeEvent::new(op, at, 0);
        event.index = edit.index();
        let (applied, affected) = match edit {
            Edit::Insert { index, value } => {
                let child = state.tree.alloc_node(&value);
                if !state.tree.array_insert(target, index, child) {
                    state.tree.free_subtree(child);
                    return Err(Error::Disjoint);
                }
                event.new_value = Some(value.clone());
                (Applied::Inserted { array: target, index, child }, value)
            }
            Edit::Remove { index } => {
                let child = state
                    .tree
                    .array_remove(target, index)
                    .ok_or(Error::Disjoint)?;
                let removed = state.tree.to_node(child).unwrap_or_default();
                event.old_value = Some(removed.clone());
                (Applied::Removed { array: target, index, child }, removed)
            }
            Edit::Replace { value } => {
                let content = state.tree.build_content(&value);
                let previous = state
                    .tree
                    .replace_content(target, content)
                    .ok_or(Error::Disjoint)?;
                event.old_value = current;
                event.new_value = Some(value.clone());
                (Applied::Replaced { node: target, previous }, value)
            }
        };

        if let Err(e) = self.notify(&handler, &affected) {
            applied.rollback(&mut state.tree);
            metrics::record_rollback(op, "handler");
            tracing::warn!(op = %op, path = %at, error = %e, "Handler rejected change, rolled back");
            return Err(Error::HandlerRejected {
                path: at.to_string(),
                reason: e.to_string(),
            });
        }

        // 5. commit
        if let Err(e) = self.source.set_config(staged) {
            applied.rollback(&mut state.tree);
            metrics::record_rollback(op, "persist");
            tracing::warn!(op = %op, path = %at, error = %e, "Persistence failed, rolled back");
            return Err(e.into());
        }
        applied.finish(&mut state.tree);

        event.version = self.finish_commit(state);
        state.history.record(event.clone());
        tracing::info!(op = %op, path = %at, version = event.version, "Change committed");
        Ok(event)
    }
}
