//! Query evaluation over the live tree.
//!
//! Recursive descent over `(node, remaining segments)`. Key and index steps
//! fail hard; wildcard and filter steps fan out and skip failing branches.

use crate::error::{Error, Result};
use crate::query::parser::{Filter, Literal, Operator, Segment};
use crate::query::QueryResult;
use crate::tree::{path, Content, Node, NodeId, Tree};

pub(crate) fn evaluate(tree: &Tree, segments: &[Segment]) -> Result<Vec<QueryResult>> {
    let mut results = Vec::new();
    descend(tree, tree.root(), path::ROOT.to_string(), segments, &mut results)?;
    Ok(results)
}

fn descend(
    tree: &Tree,
    id: NodeId,
    at: String,
    segments: &[Segment],
    results: &mut Vec<QueryResult>,
) -> Result<()> {
    let content = tree.content(id).ok_or(Error::Disjoint)?;
    let Some((segment, rest)) = segments.split_first() else {
        let node = tree.to_node(id).ok_or(Error::Disjoint)?;
        results.push(QueryResult { path: at, node });
        return Ok(());
    };

    match segment {
        Segment::Key(key) => {
            let Content::Object(members) = content else {
                return Err(traversal(format!(
                    "cannot access key '{}' on non-object at {}",
                    key, at
                )));
            };
            let child = members
                .get(key.as_str())
                .copied()
                .ok_or_else(|| traversal(format!("key '{}' not found at {}", key, at)))?;
            descend(tree, child, path::join(&at, key), rest, results)
        }
        Segment::Wildcard => {
            let Content::Object(members) = content else {
                return Err(traversal(format!("cannot use wildcard on non-object at {}", at)));
            };
            for (key, child) in members {
                fan_out(tree, *child, path::join(&at, key), rest, results);
            }
            Ok(())
        }
        Segment::ArrayWildcard => {
            let items = array_items(content, &at)?;
            for (index, child) in items.iter().enumerate() {
                fan_out(tree, *child, path::join(&at, &index.to_string()), rest, results);
            }
            Ok(())
        }
        Segment::Index(index) => {
            let items = array_items(content, &at)?;
            let child = items.get(*index).copied().ok_or_else(|| {
                traversal(format!("array index {} out of bounds at {}", index, at))
            })?;
            descend(tree, child, path::join(&at, &index.to_string()), rest, results)
        }
        Segment::Filter(filter) => {
            let items = array_items(content, &at)?;
            for (index, child) in items.iter().enumerate() {
                if matches(tree, *child, filter) {
                    fan_out(tree, *child, path::join(&at, &index.to_string()), rest, results);
                }
            }
            Ok(())
        }
    }
}

/// Continue under a wildcard or filter branch, discarding its errors.
fn fan_out(tree: &Tree, id: NodeId, at: String, rest: &[Segment], results: &mut Vec<QueryResult>) {
    let mut branch = Vec::new();
    match descend(tree, id, at, rest, &mut branch) {
        Ok(()) => results.append(&mut branch),
        Err(e) => tracing::trace!(error = %e, "Skipping query branch"),
    }
}

fn array_items<'t>(content: &'t Content, at: &str) -> Result<&'t [NodeId]> {
    match content {
        Content::Array(items) => Ok(items.as_slice()),
        _ => Err(traversal(format!("cannot use array access on non-array at {}", at))),
    }
}

fn traversal(message: String) -> Error {
    Error::QueryTraversal(message)
}

fn matches(tree: &Tree, element: NodeId, filter: &Filter) -> bool {
    let Some(Content::Object(members)) = tree.content(element) else {
        return false;
    };
    let Some(field) = members.get(filter.field.as_str()) else {
        return false;
    };
    let Some(value) = tree.content(*field) else {
        return false;
    };
    compare(value, filter.operator, &filter.value)
}

/// Field value reduced to the three comparable kinds.
enum Scalar<'a> {
    Number(f64),
    Bool(bool),
    Text(&'a str),
}

fn scalar(content: &Content) -> Option<Scalar<'_>> {
    match content {
        Content::Integer(i) => Some(Scalar::Number(*i as f64)),
        Content::Float(f) => Some(Scalar::Number(*f)),
        Content::Bool(b) => Some(Scalar::Bool(*b)),
        Content::String(s) => Some(Scalar::Text(s)),
        _ => None,
    }
}

fn compare(content: &Content, operator: Operator, literal: &Literal) -> bool {
    let Some(left) = scalar(content) else {
        return false;
    };
    match operator {
        Operator::Eq => equal(&left, literal),
        Operator::Ne => !equal(&left, literal),
        Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => {
            let (Scalar::Number(l), Literal::Number(r)) = (left, literal) else {
                return false;
            };
            match operator {
                Operator::Gt => l > *r,
                Operator::Lt => l < *r,
                Operator::Ge => l >= *r,
                _ => l <= *r,
            }
        }
    }
}

fn equal(left: &Scalar<'_>, right: &Literal) -> bool {
    match (left, right) {
        (Scalar::Number(l), Literal::Number(r)) => l == r,
        (Scalar::Bool(l), Literal::Bool(r)) => l == r,
        (Scalar::Text(l), Literal::String(r)) => *l == r.as_str(),
        _ => false,
    }
}

/// Pre-order walk collecting every node accepted by `predicate`.
pub(crate) fn find_all(
    node: &Node,
    at: String,
    predicate: &dyn Fn(&Node) -> bool,
    results: &mut Vec<QueryResult>,
) {
    if predicate(node) {
        results.push(QueryResult {
            path: at.clone(),
            node: node.clone(),
        });
    }
    match node {
        Node::Object(members) => {
            for (key, child) in members {
                find_all(child, path::join(&at, key), predicate, results);
            }
        }
        Node::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                find_all(child, path::join(&at, &index.to_string()), predicate, results);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use serde_json::json;

    fn run(tree: &Tree, query: &str) -> Result<Vec<QueryResult>> {
        evaluate(tree, &parse(query)?)
    }

    fn paths(results: &[QueryResult]) -> Vec<&str> {
        results.iter().map(|r| r.path.as_str()).collect()
    }

    #[test]
    fn test_filter_on_numeric_field() {
        let tree = Tree::from_value(&json!({
            "users": [{"name": "A", "age": 30}, {"name": "B", "age": 20}]
        }));
        let results = run(&tree, "/users/[?age>25]").unwrap();
        assert_eq!(paths(&results), vec!["/users/0"]);
        assert_eq!(results[0].node.at("name").unwrap(), &Node::from("A"));

        let results = run(&tree, "/users/[*]").unwrap();
        assert_eq!(paths(&results), vec!["/users/0", "/users/1"]);

        let results = run(&tree, "/users/[?name==B]/age").unwrap();
        assert_eq!(paths(&results), vec!["/users/1/age"]);
        assert_eq!(results[0].node, Node::Integer(20));
    }

    #[test]
    fn test_wildcard_keeps_insertion_order() {
        let tree = Tree::from_value(&json!({
            "users": {"zed": {"name": "Z"}, "amy": {"name": "A"}, "bob": {"nick": "b"}}
        }));
        let results = run(&tree, "/users/*/name").unwrap();
        assert_eq!(paths(&results), vec!["/users/zed/name", "/users/amy/name"]);
        assert_eq!(results[1].node, Node::from("A"));
    }

    #[test]
    fn test_filter_kind_rules() {
        let tree = Tree::from_value(&json!({"items": [
            {"v": "10"}, {"v": 10}, {"v": true}, {"w": 10}, 10, {"v": 10.5}
        ]}));
        assert_eq!(paths(&run(&tree, "/items/[?v==10]").unwrap()), vec!["/items/1"]);
        assert_eq!(paths(&run(&tree, "/items/[?v>=10]").unwrap()), vec!["/items/1", "/items/5"]);
        assert_eq!(paths(&run(&tree, "/items/[?v==true]").unwrap()), vec!["/items/2"]);
        // != is the negation of a same-kind equality; elements lacking the field never match
        assert_eq!(
            paths(&run(&tree, "/items/[?v!=10]").unwrap()),
            vec!["/items/0", "/items/2", "/items/5"]
        );
        // quoted literals are strings
        assert_eq!(paths(&run(&tree, "/items/[?v=='10']").unwrap()), vec!["/items/0"]);
    }

    #[test]
    fn test_hard_and_soft_errors() {
        let tree = Tree::from_value(&json!({"a": {"x": [1], "y": "s"}, "list": [1, 2]}));

        assert!(matches!(run(&tree, "/missing"), Err(Error::QueryTraversal(_))));
        assert!(matches!(run(&tree, "/list/[5]"), Err(Error::QueryTraversal(_))));
        assert!(matches!(run(&tree, "/a/[0]"), Err(Error::QueryTraversal(_))));
        assert!(matches!(run(&tree, "/list/*"), Err(Error::QueryTraversal(_))));

        // /a/y has no index 0; that branch is skipped.
        let results = run(&tree, "/a/*/[0]").unwrap();
        assert_eq!(paths(&results), vec!["/a/x/0"]);
        assert!(run(&tree, "/a/*/nothing").unwrap().is_empty());
    }

    #[test]
    fn test_root_query() {
        let value = json!({"a": [1]});
        let tree = Tree::from_value(&value);
        let results = run(&tree, "/").unwrap();
        assert_eq!(paths(&results), vec!["/"]);
        assert_eq!(results[0].node.to_value(), value);
    }

    #[test]
    fn test_find_all_pre_order() {
        let node: Node = json!({"a": 1, "b": [2, {"c": 3}]}).into();
        let mut results = Vec::new();
        find_all(&node, "/".into(), &|n| n.as_int().is_ok(), &mut results);
        assert_eq!(paths(&results), vec!["/a", "/b/0", "/b/1/c"]);
    }
}
