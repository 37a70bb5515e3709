//! Owned configuration values.
//!
//! `Node` is the value type that crosses the manager's lock boundary: query
//! results, handler arguments, snapshots and change events all carry owned
//! copies. Each child is owned by exactly one parent, so `Clone` is a deep copy.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{Error, Result};
use crate::tree::path;

/// Variant tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Null,
    Bool,
    Integer,
    Float,
    String,
    Object,
    Array,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Null => "null",
            NodeType::Bool => "bool",
            NodeType::Integer => "integer",
            NodeType::Float => "float",
            NodeType::String => "string",
            NodeType::Object => "object",
            NodeType::Array => "array",
        };
        f.write_str(name)
    }
}

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    /// Whole numbers that fit in `i64`.
    Integer(i64),
    /// Fractional numbers, and whole numbers above `i64::MAX`, which are
    /// rounded to the nearest `f64`.
    Float(f64),
    String(String),
    /// Members in insertion order.
    Object(IndexMap<String, Node>),
    Array(Vec<Node>),
}

/// One navigation step: an object key or an array index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(name: &'a str) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key<'_> {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Null => NodeType::Null,
            Node::Bool(_) => NodeType::Bool,
            Node::Integer(_) => NodeType::Integer,
            Node::Float(_) => NodeType::Float,
            Node::String(_) => NodeType::String,
            Node::Object(_) => NodeType::Object,
            Node::Array(_) => NodeType::Array,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    fn mismatch(&self, expected: NodeType) -> Error {
        Error::TypeMismatch {
            expected,
            found: self.node_type(),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Node::String(s) => Ok(s),
            other => Err(other.mismatch(NodeType::String)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Node::Bool(b) => Ok(*b),
            other => Err(other.mismatch(NodeType::Bool)),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Node::Integer(i) => Ok(*i),
            other => Err(other.mismatch(NodeType::Integer)),
        }
    }

    /// Floating point view; integers are widened.
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Node::Float(f) => Ok(*f),
            Node::Integer(i) => Ok(*i as f64),
            other => Err(other.mismatch(NodeType::Float)),
        }
    }

    pub fn as_object(&self) -> Result<&IndexMap<String, Node>> {
        match self {
            Node::Object(members) => Ok(members),
            other => Err(other.mismatch(NodeType::Object)),
        }
    }

    pub fn as_array(&self) -> Result<&[Node]> {
        match self {
            Node::Array(items) => Ok(items),
            other => Err(other.mismatch(NodeType::Array)),
        }
    }

    /// Navigate one level down by key or index.
    pub fn at<'a>(&self, key: impl Into<Key<'a>>) -> Result<&Node> {
        match key.into() {
            Key::Name(name) => self
                .as_object()?
                .get(name)
                .ok_or_else(|| Error::NotFound(name.to_string())),
            Key::Index(index) => {
                let items = self.as_array()?;
                items.get(index).ok_or(Error::IndexOutOfBounds {
                    index,
                    len: items.len(),
                })
            }
        }
    }

    /// Navigate a `/`-separated path. Segments address object keys or, on
    /// arrays, decimal indices.
    pub fn pointer(&self, path: &str) -> Result<&Node> {
        let mut current = self;
        for segment in path::segments(path) {
            current = match current {
                Node::Array(_) => current.at(path::parse_index(segment)?)?,
                _ => current.at(segment)?,
            };
        }
        Ok(current)
    }

    /// Convert to a JSON value. Non-finite floats become `null`.
    pub fn to_value(&self) -> Value {
        Value::from(self)
    }
}

impl From<&Node> for Value {
    fn from(node: &Node) -> Self {
        match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Integer(i) => Value::Number((*i).into()),
            Node::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Node::String(s) => Value::String(s.clone()),
            Node::Object(members) => Value::Object(
                members
                    .iter()
                    .map(|(key, child)| (key.clone(), Value::from(child)))
                    .collect(),
            ),
            Node::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::from(&node)
    }
}

impl From<&Value> for Node {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::Integer(i),
                None => n.as_f64().map_or(Node::Null, Node::Float),
            },
            Value::String(s) => Node::String(s.clone()),
            Value::Object(members) => Node::Object(
                members
                    .iter()
                    .map(|(key, child)| (key.clone(), Node::from(child)))
                    .collect(),
            ),
            Value::Array(items) => Node::Array(items.iter().map(Node::from).collect()),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::from(&value)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Self {
        Node::Integer(i)
    }
}

impl From<i32> for Node {
    fn from(i: i32) -> Self {
        Node::Integer(i.into())
    }
}

impl From<f64> for Node {
    fn from(f: f64) -> Self {
        Node::Float(f)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Array(items)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_accessors() {
        let node = Node::from(json!({"name": "api", "port": 8080, "ratio": 0.5, "on": true}));

        assert_eq!(node.at("name").unwrap().as_str().unwrap(), "api");
        assert_eq!(node.at("port").unwrap().as_int().unwrap(), 8080);
        assert_eq!(node.at("port").unwrap().as_float().unwrap(), 8080.0);
        assert_eq!(node.at("ratio").unwrap().as_float().unwrap(), 0.5);
        assert!(node.at("on").unwrap().as_bool().unwrap());

        match node.at("name").unwrap().as_int() {
            Err(Error::TypeMismatch { expected, found }) => {
                assert_eq!(expected, NodeType::Integer);
                assert_eq!(found, NodeType::String);
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_navigation_errors() {
        let node = Node::from(json!({"items": [1, 2]}));

        assert!(matches!(node.at("missing"), Err(Error::NotFound(_))));
        let items = node.at("items").unwrap();
        assert_eq!(items.at(1).unwrap(), &Node::Integer(2));
        assert!(matches!(
            items.at(2),
            Err(Error::IndexOutOfBounds { index: 2, len: 2 })
        ));
        assert!(matches!(items.at("x"), Err(Error::TypeMismatch { .. })));
        assert_eq!(node.pointer("/items/0").unwrap(), &Node::Integer(1));
        assert_eq!(node.pointer("/").unwrap(), &node);
    }

    #[test]
    fn test_object_order_preserved() {
        let node = Node::from(json!({"zeta": 1, "alpha": 2, "mid": 3}));
        let keys: Vec<&str> = node.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(node.to_value().to_string(), r#"{"zeta":1,"alpha":2,"mid":3}"#);
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let original = Node::from(json!({"list": [{"a": 1}]}));
        let mut copy = original.clone();
        if let Node::Object(members) = &mut copy {
            members.insert("list".into(), Node::Null);
        }
        assert_eq!(original.pointer("/list/0/a").unwrap(), &Node::Integer(1));
        assert!(copy.at("list").unwrap().is_null());
    }

    #[test]
    fn test_number_conversion() {
        assert_eq!(Node::from(json!(3)), Node::Integer(3));
        assert_eq!(Node::from(json!(3.25)), Node::Float(3.25));
        assert_eq!(Node::Float(f64::NAN).to_value(), Value::Null);

        let parsed: Node = serde_json::from_str(r#"{"a": [1, 1.5, "x", null]}"#).unwrap();
        assert_eq!(parsed.pointer("/a/0").unwrap().node_type(), NodeType::Integer);
        assert_eq!(parsed.pointer("/a/1").unwrap().node_type(), NodeType::Float);
        assert!(parsed.pointer("/a/3").unwrap().is_null());

        // Past i64::MAX the value widens to a float and loses precision.
        let big = json!(u64::MAX);
        assert_eq!(Node::from(&big), Node::Float(u64::MAX as f64));
        let parsed: Node = serde_json::from_str(&big.to_string()).unwrap();
        assert_eq!(parsed.node_type(), NodeType::Float);
    }
}
