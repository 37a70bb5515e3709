//! The live document: an arena of nodes addressed by `NodeId`.
//!
//! # Responsibilities
//! - Own every node of the document in one slot vector
//! - Give each node a stable identity that survives sibling edits
//! - Copy subtrees out as owned `Node` values
//!
//! # Design Decisions
//! - Identity is a generational index: freeing a slot bumps its generation,
//!   so an id held across a removal never aliases a newer node
//! - Containers store child ids, never child values; a child id appears in
//!   exactly one container
//! - Edits that detach a subtree do not free it; the mutation protocol frees
//!   detached slots only once the change is committed, so rollback can reattach

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::tree::node::{Node, NodeType};

/// Identity of a node within a `Tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Contents of one slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Object(IndexMap<String, NodeId>),
    Array(Vec<NodeId>),
}

impl Content {
    pub fn node_type(&self) -> NodeType {
        match self {
            Content::Null => NodeType::Null,
            Content::Bool(_) => NodeType::Bool,
            Content::Integer(_) => NodeType::Integer,
            Content::Float(_) => NodeType::Float,
            Content::String(_) => NodeType::String,
            Content::Object(_) => NodeType::Object,
            Content::Array(_) => NodeType::Array,
        }
    }

    /// Child ids in iteration order (insertion order for objects).
    pub fn child_ids(&self) -> Vec<NodeId> {
        match self {
            Content::Object(members) => members.values().copied().collect(),
            Content::Array(items) => items.clone(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    content: Option<Content>,
}

/// Arena-backed document tree.
#[derive(Debug)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    live: usize,
}

impl Tree {
    /// Build a tree holding a copy of `node`.
    pub fn from_node(node: &Node) -> Self {
        let mut tree = Self::empty();
        tree.root = tree.alloc_node(node);
        tree
    }

    /// Build a tree from a JSON document.
    pub fn from_value(value: &Value) -> Self {
        let mut tree = Self::empty();
        tree.root = tree.alloc_value(value);
        tree
    }

    fn empty() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            live: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of allocated nodes, including detached ones awaiting release.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// True if `id` names an allocated slot. Says nothing about reachability.
    pub fn contains(&self, id: NodeId) -> bool {
        self.content(id).is_some()
    }

    pub fn content(&self, id: NodeId) -> Option<&Content> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.content.as_ref())
    }

    pub(crate) fn content_mut(&mut self, id: NodeId) -> Option<&mut Content> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.content.as_mut())
    }

    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        self.content(id).map(Content::node_type)
    }

    /// Length of the array at `id`, if it is one.
    pub fn array_len(&self, id: NodeId) -> Option<usize> {
        match self.content(id)? {
            Content::Array(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Deep copy of the subtree rooted at `id`.
    pub fn to_node(&self, id: NodeId) -> Option<Node> {
        let node = match self.content(id)? {
            Content::Null => Node::Null,
            Content::Bool(b) => Node::Bool(*b),
            Content::Integer(i) => Node::Integer(*i),
            Content::Float(f) => Node::Float(*f),
            Content::String(s) => Node::String(s.clone()),
            Content::Object(members) => {
                let mut copy = IndexMap::with_capacity(members.len());
                for (key, child) in members {
                    copy.insert(key.clone(), self.to_node(*child)?);
                }
                Node::Object(copy)
            }
            Content::Array(items) => {
                let copy = items
                    .iter()
                    .map(|child| self.to_node(*child))
                    .collect::<Option<Vec<_>>>()?;
                Node::Array(copy)
            }
        };
        Some(node)
    }

    /// The whole document as JSON.
    pub fn to_value(&self) -> Value {
        self.to_node(self.root)
            .map(|node| node.to_value())
            .unwrap_or(Value::Null)
    }

    fn alloc(&mut self, content: Content) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.content = Some(content);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            content: Some(content),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Allocate a detached subtree holding a copy of `node`.
    pub(crate) fn alloc_node(&mut self, node: &Node) -> NodeId {
        let content = self.build_content(node);
        self.alloc(content)
    }

    /// Allocate the children of `node` and return the content for its slot.
    pub(crate) fn build_content(&mut self, node: &Node) -> Content {
        match node {
            Node::Null => Content::Null,
            Node::Bool(b) => Content::Bool(*b),
            Node::Integer(i) => Content::Integer(*i),
            Node::Float(f) => Content::Float(*f),
            Node::String(s) => Content::String(s.clone()),
            Node::Object(members) => Content::Object(
                members
                    .iter()
                    .map(|(key, child)| (key.clone(), self.alloc_node(child)))
                    .collect(),
            ),
            Node::Array(items) => {
                Content::Array(items.iter().map(|child| self.alloc_node(child)).collect())
            }
        }
    }

    fn alloc_value(&mut self, value: &Value) -> NodeId {
        let content = match value {
            Value::Null => Content::Null,
            Value::Bool(b) => Content::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Content::Integer(i),
                None => n.as_f64().map_or(Content::Null, Content::Float),
            },
            Value::String(s) => Content::String(s.clone()),
            Value::Object(members) => Content::Object(
                members
                    .iter()
                    .map(|(key, child)| (key.clone(), self.alloc_value(child)))
                    .collect(),
            ),
            Value::Array(items) => {
                Content::Array(items.iter().map(|child| self.alloc_value(child)).collect())
            }
        };
        self.alloc(content)
    }

    /// Release `id` and everything below it.
    pub(crate) fn free_subtree(&mut self, id: NodeId) {
        let Some(slot) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        let Some(content) = slot.content.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        self.free_children(&content);
    }

    /// Release every child subtree referenced by `content`.
    pub(crate) fn free_children(&mut self, content: &Content) {
        for child in content.child_ids() {
            self.free_subtree(child);
        }
    }

    /// Swap the contents of `id`, returning the previous contents. The node
    /// keeps its identity; children of the old contents stay allocated.
    pub(crate) fn replace_content(&mut self, id: NodeId, content: Content) -> Option<Content> {
        let slot = self.content_mut(id)?;
        Some(std::mem::replace(slot, content))
    }

    /// Splice `child` into the array at `array` before `index`.
    pub(crate) fn array_insert(&mut self, array: NodeId, index: usize, child: NodeId) -> bool {
        match self.content_mut(array) {
            Some(Content::Array(items)) if index <= items.len() => {
                items.insert(index, child);
                true
            }
            _ => false,
        }
    }

    /// Detach the element at `index`; the detached subtree stays allocated.
    pub(crate) fn array_remove(&mut self, array: NodeId, index: usize) -> Option<NodeId> {
        match self.content_mut(array) {
            Some(Content::Array(items)) if index < items.len() => Some(items.remove(index)),
            _ => None,
        }
    }

    /// Replace the whole document, keeping the arena so old ids stay dead.
    pub(crate) fn reset(&mut self, node: &Node) {
        let old_root = self.root;
        self.free_subtree(old_root);
        self.root = self.alloc_node(node);
    }
}
