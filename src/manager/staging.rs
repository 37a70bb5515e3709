//! Edits applied to the staged clone of the serialized document.
//!
//! Schema validation works on `serde_json::Value`, so every change is first
//! replayed on a clone of the source's document. A path that cannot be
//! traversed here yields `PathEditFailed`.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::tree::path;

fn failed(at: &str, reason: impl Into<String>) -> Error {
    Error::PathEditFailed {
        path: at.to_string(),
        reason: reason.into(),
    }
}

/// Mutable reference to the value at `at`.
pub(crate) fn locate_mut<'v>(document: &'v mut Value, at: &str) -> Result<&'v mut Value> {
    let mut current = document;
    for segment in path::segments(at) {
        current = match current {
            Value::Object(members) => members
                .get_mut(segment)
                .ok_or_else(|| failed(at, format!("key `{}` not found", segment)))?,
            Value::Array(items) => {
                let len = items.len();
                let index = segment
                    .parse::<usize>()
                    .map_err(|_| failed(at, format!("`{}` is not an array index", segment)))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| failed(at, format!("index {} out of bounds (length {})", index, len)))?
            }
            _ => return Err(failed(at, format!("cannot descend into scalar at `{}`", segment))),
        };
    }
    Ok(current)
}

fn array_mut<'v>(document: &'v mut Value, at: &str) -> Result<&'v mut Vec<Value>> {
    match locate_mut(document, at)? {
        Value::Array(items) => Ok(items),
        _ => Err(failed(at, "target is not an array")),
    }
}

/// Insert `value` before `index` in the array at `at`.
pub(crate) fn insert(document: &mut Value, at: &str, index: usize, value: Value) -> Result<()> {
    let items = array_mut(document, at)?;
    if index > items.len() {
        return Err(failed(at, format!("index {} out of bounds (length {})", index, items.len())));
    }
    items.insert(index, value);
    Ok(())
}

/// Remove the element at `index` from the array at `at`.
pub(crate) fn remove(document: &mut Value, at: &str, index: usize) -> Result<Value> {
    let items = array_mut(document, at)?;
    if index >= items.len() {
        return Err(failed(at, format!("index {} out of bounds (length {})", index, items.len())));
    }
    Ok(items.remove(index))
}

/// Overwrite the value at `at`.
pub(crate) fn replace(document: &mut Value, at: &str, value: Value) -> Result<Value> {
    let slot = locate_mut(document, at)?;
    Ok(std::mem::replace(slot, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edits() {
        let mut doc = json!({"items": [1, 2, 3], "nested": {"list": [{"k": 1}]}});

        insert(&mut doc, "/items", 3, json!(4)).unwrap();
        assert_eq!(doc["items"], json!([1, 2, 3, 4]));

        assert_eq!(remove(&mut doc, "/items", 0).unwrap(), json!(1));
        assert_eq!(doc["items"], json!([2, 3, 4]));

        let old = replace(&mut doc, "/nested/list/0/k", json!("v")).unwrap();
        assert_eq!(old, json!(1));
        assert_eq!(doc["nested"]["list"][0]["k"], json!("v"));

        replace(&mut doc, "/", json!({"fresh": true})).unwrap();
        assert_eq!(doc, json!({"fresh": true}));
    }

    #[test]
    fn test_untraversable_paths() {
        let mut doc = json!({"items": [1], "name": "x"});
        for (result, what) in [
            (insert(&mut doc.clone(), "/missing", 0, json!(1)), "missing key"),
            (insert(&mut doc.clone(), "/name", 0, json!(1)), "not an array"),
            (insert(&mut doc.clone(), "/items", 5, json!(1)), "out of bounds"),
            (insert(&mut doc.clone(), "/name/x", 0, json!(1)), "scalar"),
            (insert(&mut doc.clone(), "/items/x", 0, json!(1)), "bad index"),
        ] {
            assert!(matches!(result, Err(Error::PathEditFailed { .. })), "{}", what);
        }
        assert!(remove(&mut doc, "/items", 1).is_err());
    }
}
