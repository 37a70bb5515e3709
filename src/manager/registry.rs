//! Modifiable registry: which nodes may change, and who hears about it.
//!
//! # Responsibilities
//! - Bind (kind, node) pairs to change handlers
//! - Look bindings up by exact (kind, path)
//! - Re-synchronize paths after a commit and drop bindings whose node is gone
//!
//! # Design Decisions
//! - Keyed by `(kind, path)` in an `IndexMap`: O(1) lookup, registration order kept
//! - The node id is the source of truth; the path is derived and refreshed on
//!   every commit because an insert or remove shifts sibling indices

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tree::{path, NodeId, NodeType, PathCache, Tree};
use crate::tree::Node;

/// Error type handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Change handler; receives a copy of the inserted, removed or new node.
pub type Handler = Arc<dyn Fn(&Node) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Kind of change a binding allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifiableKind {
    Insertable,
    Removable,
    Replaceable,
}

impl ModifiableKind {
    /// Insert and remove bindings must target arrays.
    pub fn requires_array(&self) -> bool {
        matches!(self, ModifiableKind::Insertable | ModifiableKind::Removable)
    }
}

impl fmt::Display for ModifiableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModifiableKind::Insertable => "insertable",
            ModifiableKind::Removable => "removable",
            ModifiableKind::Replaceable => "replaceable",
        })
    }
}

/// One registered binding.
#[derive(Clone)]
pub struct Modifiable {
    pub kind: ModifiableKind,
    pub path: String,
    pub node: NodeId,
    pub(crate) handler: Handler,
}

impl fmt::Debug for Modifiable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifiable")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

/// Path lists per kind, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiablePaths {
    pub insertable: Vec<String>,
    pub removable: Vec<String>,
    pub replaceable: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: IndexMap<(ModifiableKind, String), Modifiable>,
}

impl Registry {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Bind `node` (currently at `path`) for `kind`.
    pub(crate) fn register(
        &mut self,
        tree: &Tree,
        kind: ModifiableKind,
        path: String,
        node: NodeId,
        handler: Handler,
    ) -> Result<()> {
        if kind.requires_array() {
            let found = tree.node_type(node).ok_or(Error::Disjoint)?;
            if found != NodeType::Array {
                return Err(Error::TypeMismatch {
                    expected: NodeType::Array,
                    found,
                });
            }
        }

        let key = (kind, path);
        if self.entries.contains_key(&key) {
            let (kind, path) = key;
            return Err(Error::AlreadyRegistered { kind, path });
        }

        let entry = Modifiable {
            kind,
            path: key.1.clone(),
            node,
            handler,
        };
        self.entries.insert(key, entry);
        Ok(())
    }

    pub(crate) fn find(&self, kind: ModifiableKind, path: &str) -> Option<&Modifiable> {
        self.entries.get(&(kind, path.to_string()))
    }

    pub(crate) fn paths(&self, kind: ModifiableKind) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.path.clone())
            .collect()
    }

    pub(crate) fn all_paths(&self) -> ModifiablePaths {
        ModifiablePaths {
            insertable: self.paths(ModifiableKind::Insertable),
            removable: self.paths(ModifiableKind::Removable),
            replaceable: self.paths(ModifiableKind::Replaceable),
        }
    }

    /// Recompute every path from its node id after a commit. Entries whose node
    /// became unreachable, or no longer has the type its kind needs, are dropped.
    pub(crate) fn resync(&mut self, tree: &Tree, cache: &mut PathCache) -> usize {
        let before = self.entries.len();
        let entries = std::mem::take(&mut self.entries);
        for (_, mut entry) in entries {
            let Some(path) = cache.lookup(tree, entry.node) else {
                tracing::debug!(kind = %entry.kind, path = %entry.path, "Dropping detached binding");
                continue;
            };
            if !Self::type_fits(tree, &entry) {
                tracing::debug!(kind = %entry.kind, path = %path, "Dropping binding, node is no longer an array");
                continue;
            }
            entry.path = path;
            self.entries.insert((entry.kind, entry.path.clone()), entry);
        }
        before - self.entries.len()
    }

    /// Re-bind every entry by path after the tree was rebuilt wholesale.
    pub(crate) fn rebind(&mut self, tree: &Tree) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| match path::resolve(tree, &entry.path) {
            Ok(node) => {
                entry.node = node;
                if Self::type_fits(tree, entry) {
                    true
                } else {
                    tracing::debug!(kind = %entry.kind, path = %entry.path, "Dropping binding, node is no longer an array");
                    false
                }
            }
            Err(_) => {
                tracing::debug!(kind = %entry.kind, path = %entry.path, "Dropping binding, path no longer resolves");
                false
            }
        });
        before - self.entries.len()
    }

    fn type_fits(tree: &Tree, entry: &Modifiable) -> bool {
        !entry.kind.requires_array() || tree.node_type(entry.node) == Some(NodeType::Array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> Handler {
        Arc::new(|_| Ok(()))
    }

    fn bind(registry: &mut Registry, tree: &Tree, kind: ModifiableKind, at: &str) -> Result<()> {
        let node = path::resolve(tree, at)?;
        registry.register(tree, kind, path::normalize(at), node, noop())
    }

    #[test]
    fn test_register_rules() {
        let tree = Tree::from_value(&json!({"items": [1], "name": "x"}));
        let mut registry = Registry::default();

        bind(&mut registry, &tree, ModifiableKind::Insertable, "/items").unwrap();
        bind(&mut registry, &tree, ModifiableKind::Replaceable, "/items").unwrap();
        bind(&mut registry, &tree, ModifiableKind::Replaceable, "/name").unwrap();

        assert!(matches!(
            bind(&mut registry, &tree, ModifiableKind::Insertable, "/items"),
            Err(Error::AlreadyRegistered { .. })
        ));
        assert!(matches!(
            bind(&mut registry, &tree, ModifiableKind::Removable, "/name"),
            Err(Error::TypeMismatch { expected: NodeType::Array, found: NodeType::String })
        ));

        assert!(registry.find(ModifiableKind::Insertable, "/items").is_some());
        assert!(registry.find(ModifiableKind::Removable, "/items").is_none());
        assert_eq!(
            registry.all_paths(),
            ModifiablePaths {
                insertable: vec!["/items".into()],
                removable: vec![],
                replaceable: vec!["/items".into(), "/name".into()],
            }
        );
    }

    #[test]
    fn test_resync_shifts_and_drops() {
        let mut tree = Tree::from_value(&json!({"groups": [[1], [2], [3]]}));
        let mut registry = Registry::default();
        let mut cache = PathCache::new();
        for at in ["/groups/0", "/groups/1", "/groups/2"] {
            bind(&mut registry, &tree, ModifiableKind::Insertable, at).unwrap();
        }

        let groups = path::resolve(&tree, "/groups").unwrap();
        let removed = tree.array_remove(groups, 1).unwrap();
        tree.free_subtree(removed);
        cache.invalidate();

        assert_eq!(registry.resync(&tree, &mut cache), 1);
        assert_eq!(
            registry.paths(ModifiableKind::Insertable),
            vec!["/groups/0".to_string(), "/groups/1".to_string()]
        );
        let moved = registry.find(ModifiableKind::Insertable, "/groups/1").unwrap();
        assert_eq!(tree.to_node(moved.node), Some(Node::Array(vec![Node::Integer(3)])));
    }

    #[test]
    fn test_rebind_by_path() {
        let tree = Tree::from_value(&json!({"items": [1], "limits": [2]}));
        let mut registry = Registry::default();
        bind(&mut registry, &tree, ModifiableKind::Insertable, "/items").unwrap();
        bind(&mut registry, &tree, ModifiableKind::Insertable, "/limits").unwrap();

        let rebuilt = Tree::from_value(&json!({"items": [1, 2], "limits": "none"}));
        assert_eq!(registry.rebind(&rebuilt), 1);
        let entry = registry.find(ModifiableKind::Insertable, "/items").unwrap();
        assert_eq!(entry.node, path::resolve(&rebuilt, "/items").unwrap());
        assert_eq!(registry.len(), 1);
    }
}
