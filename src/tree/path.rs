//! Structural paths and the identity → path cache.
//!
//! # Responsibilities
//! - Find the path of a node by identity (depth-first search)
//! - Resolve a path back to a node id
//! - Cache id → path for the whole tree between commits
//!
//! # Design Decisions
//! - Paths are `/`-joined object keys and array indices; the root is `/`
//! - Empty segments are ignored, so `""`, `"/"` and `"/a//b"` are accepted
//! - The cache is all-or-nothing: one insert or remove shifts every later
//!   sibling's index, so any commit invalidates the whole map

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::tree::arena::{Content, NodeId, Tree};
use crate::tree::node::NodeType;

/// Path of the document root.
pub const ROOT: &str = "/";

/// Non-empty segments of a path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Append one segment to a parent path.
pub fn join(parent: &str, segment: &str) -> String {
    if parent.is_empty() || parent == ROOT {
        format!("/{}", segment)
    } else {
        format!("{}/{}", parent, segment)
    }
}

/// Canonical spelling of a path: leading slash, no empty segments.
pub fn normalize(path: &str) -> String {
    let joined: Vec<&str> = segments(path).collect();
    if joined.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", joined.join("/"))
    }
}

/// Parse an array index segment.
pub fn parse_index(segment: &str) -> Result<usize> {
    segment
        .parse::<usize>()
        .map_err(|_| Error::NotFound(segment.to_string()))
}

/// Path of `target` found by depth-first search from the root.
pub fn find_path(tree: &Tree, target: NodeId) -> Option<String> {
    let mut trail = Vec::new();
    if search(tree, tree.root(), target, &mut trail) {
        Some(normalize(&trail.join("/")))
    } else {
        None
    }
}

fn search(tree: &Tree, current: NodeId, target: NodeId, trail: &mut Vec<String>) -> bool {
    if current == target {
        return true;
    }
    match tree.content(current) {
        Some(Content::Object(members)) => {
            for (key, child) in members {
                trail.push(key.clone());
                if search(tree, *child, target, trail) {
                    return true;
                }
                trail.pop();
            }
        }
        Some(Content::Array(items)) => {
            for (index, child) in items.iter().enumerate() {
                trail.push(index.to_string());
                if search(tree, *child, target, trail) {
                    return true;
                }
                trail.pop();
            }
        }
        _ => {}
    }
    false
}

/// Node id at `path`.
pub fn resolve(tree: &Tree, path: &str) -> Result<NodeId> {
    let mut current = tree.root();
    for segment in segments(path) {
        current = match tree.content(current) {
            Some(Content::Object(members)) => members
                .get(segment)
                .copied()
                .ok_or_else(|| Error::NotFound(segment.to_string()))?,
            Some(Content::Array(items)) => {
                let index = parse_index(segment)?;
                items.get(index).copied().ok_or(Error::IndexOutOfBounds {
                    index,
                    len: items.len(),
                })?
            }
            Some(other) => {
                return Err(Error::TypeMismatch {
                    expected: NodeType::Object,
                    found: other.node_type(),
                })
            }
            None => return Err(Error::Disjoint),
        };
    }
    Ok(current)
}

/// Memoized id → path mapping for every node reachable from the root.
#[derive(Debug, Default)]
pub struct PathCache {
    paths: HashMap<NodeId, String>,
    valid: bool,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Drop every entry; the next lookup rebuilds the map.
    pub fn invalidate(&mut self) {
        self.paths.clear();
        self.valid = false;
    }

    /// Path of `id`, rebuilding the map first if it was invalidated.
    pub fn lookup(&mut self, tree: &Tree, id: NodeId) -> Option<String> {
        if !self.valid {
            self.rebuild(tree);
        }
        self.paths.get(&id).cloned()
    }

    /// Path of `id` without touching the map; falls back to a tree search
    /// while the map is invalid.
    pub fn peek(&self, tree: &Tree, id: NodeId) -> Option<String> {
        if self.valid {
            self.paths.get(&id).cloned()
        } else {
            find_path(tree, id)
        }
    }

    fn rebuild(&mut self, tree: &Tree) {
        self.paths.clear();
        let mut stack = vec![(tree.root(), ROOT.to_string())];
        while let Some((id, path)) = stack.pop() {
            match tree.content(id) {
                Some(Content::Object(members)) => {
                    for (key, child) in members {
                        stack.push((*child, join(&path, key)));
                    }
                }
                Some(Content::Array(items)) => {
                    for (index, child) in items.iter().enumerate() {
                        stack.push((*child, join(&path, &index.to_string())));
                    }
                }
                Some(_) => {}
                None => continue,
            }
            self.paths.insert(id, path);
        }
        self.valid = true;
        tracing::trace!(entries = self.paths.len(), "Path cache rebuilt");
    }
}
