//! Per-path custom validators and the stock rule constructors.
//!
//! # Responsibilities
//! - Hold validator functions keyed by exact document path
//! - Run them in registration order, stopping at the first failure
//! - Provide common rules: numeric range, glob pattern, allowed values,
//!   required value, unique field across array elements

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::tree::{Node, NodeType};
use crate::validation::ValidationError;

/// A validator: `(path, current value, staged value) -> Ok or a message`.
pub type ValidatorFn = Arc<dyn Fn(&str, Option<&Node>, &Node) -> Result<(), String> + Send + Sync>;

/// Validators keyed by exact path.
#[derive(Default, Clone)]
pub struct CustomValidators {
    by_path: HashMap<String, Vec<ValidatorFn>>,
}

impl std::fmt::Debug for CustomValidators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .by_path
            .iter()
            .map(|(path, list)| (path.as_str(), list.len()))
            .collect();
        f.debug_struct("CustomValidators").field("paths", &counts).finish()
    }
}

impl CustomValidators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator for `path`.
    pub fn add(&mut self, path: impl Into<String>, validator: ValidatorFn) {
        self.by_path.entry(path.into()).or_default().push(validator);
    }

    /// Number of validators registered for `path`.
    pub fn count(&self, path: &str) -> usize {
        self.by_path.get(path).map_or(0, Vec::len)
    }

    /// Run the validators for `path`; the first failure wins.
    pub fn validate(
        &self,
        path: &str,
        old: Option<&Node>,
        new: &Node,
    ) -> Result<(), ValidationError> {
        let Some(validators) = self.by_path.get(path) else {
            return Ok(());
        };
        for validator in validators {
            validator(path, old, new).map_err(|message| ValidationError::Custom {
                path: path.to_string(),
                message,
            })?;
        }
        Ok(())
    }
}

/// Numeric value within `[min, max]`.
pub fn range(min: f64, max: f64) -> ValidatorFn {
    Arc::new(move |path, _old, new| {
        let value = new
            .as_float()
            .map_err(|_| format!("expected numeric value at {}", path))?;
        if value < min || value > max {
            return Err(format!(
                "value {} at {} must be between {} and {}",
                value, path, min, max
            ));
        }
        Ok(())
    })
}

/// String matching a glob where `*` matches any run of characters.
pub fn pattern(glob: impl Into<String>) -> ValidatorFn {
    let glob = glob.into();
    Arc::new(move |path, _old, new| {
        let value = new
            .as_str()
            .map_err(|_| format!("expected string value at {}", path))?;
        if !glob_match(&glob, value) {
            return Err(format!(
                "value '{}' at {} does not match pattern '{}'",
                value, path, glob
            ));
        }
        Ok(())
    })
}

/// Scalar equal to one of `allowed`. Numbers compare numerically.
pub fn one_of(allowed: Vec<Node>) -> ValidatorFn {
    Arc::new(move |path, _old, new| {
        if !matches!(
            new.node_type(),
            NodeType::String | NodeType::Integer | NodeType::Float | NodeType::Bool
        ) {
            return Err(format!("unsupported type for enum validation at {}", path));
        }
        if allowed.iter().any(|candidate| scalar_eq(candidate, new)) {
            return Ok(());
        }
        let listed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
        Err(format!(
            "value {} at {} is not in allowed values: [{}]",
            new,
            path,
            listed.join(", ")
        ))
    })
}

/// Non-null value; strings must also be non-empty.
pub fn required() -> ValidatorFn {
    Arc::new(|path, _old, new| match new {
        Node::Null => Err(format!("value at {} is required", path)),
        Node::String(s) if s.is_empty() => Err(format!("value at {} cannot be empty", path)),
        _ => Ok(()),
    })
}

/// Object elements of an array carry distinct scalar values for `field`.
/// Non-arrays, non-object elements and elements lacking the field are ignored.
pub fn unique_by(field: impl Into<String>) -> ValidatorFn {
    let field = field.into();
    Arc::new(move |path, _old, new| {
        let Ok(items) = new.as_array() else {
            return Ok(());
        };
        let mut seen = HashSet::new();
        for (index, item) in items.iter().enumerate() {
            let Ok(value) = item.at(field.as_str()) else {
                continue;
            };
            let key = match value {
                Node::String(s) => format!("s:{}", s),
                Node::Bool(b) => format!("b:{}", b),
                Node::Integer(_) | Node::Float(_) => match value.as_float() {
                    Ok(f) => format!("n:{}", f),
                    Err(_) => continue,
                },
                _ => continue,
            };
            if !seen.insert(key) {
                return Err(format!(
                    "duplicate value '{}' for field '{}' at {}[{}]",
                    value, field, path, index
                ));
            }
        }
        Ok(())
    })
}

fn scalar_eq(a: &Node, b: &Node) -> bool {
    match (a, b) {
        (Node::String(x), Node::String(y)) => x == y,
        (Node::Bool(x), Node::Bool(y)) => x == y,
        _ => match (a.as_float(), b.as_float()) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        },
    }
}

/// Glob match where `*` matches any (possibly empty) run of characters.
pub fn glob_match(glob: &str, text: &str) -> bool {
    let pattern: Vec<char> = glob.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = t;
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some(star_at) = star {
            p = star_at + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_wins() {
        let mut validators = CustomValidators::new();
        validators.add("/port", range(1.0, 65535.0));
        validators.add("/port", Arc::new(|_, _, _| Err("never reached".into())));

        let err = validators.validate("/port", None, &Node::Integer(0)).unwrap_err();
        assert!(matches!(
            &err,
            ValidationError::Custom { path, message } if path == "/port" && message.contains("between")
        ));

        let err = validators.validate("/port", None, &Node::Integer(80)).unwrap_err();
        assert!(err.to_string().contains("never reached"));

        assert!(validators.validate("/other", None, &Node::Null).is_ok());
        assert_eq!(validators.count("/port"), 2);
    }

    #[test]
    fn test_validator_sees_old_value() {
        let mut validators = CustomValidators::new();
        validators.add(
            "/level",
            Arc::new(|_, old, new| match (old.and_then(|n| n.as_int().ok()), new.as_int()) {
                (Some(before), Ok(after)) if after < before => Err("level cannot decrease".into()),
                _ => Ok(()),
            }),
        );
        let old = Node::Integer(5);
        assert!(validators.validate("/level", Some(&old), &Node::Integer(3)).is_err());
        assert!(validators.validate("/level", Some(&old), &Node::Integer(7)).is_ok());
        assert!(validators.validate("/level", None, &Node::Integer(1)).is_ok());
    }

    #[test]
    fn test_stock_rules() {
        assert!(range(0.0, 1.0)("/r", None, &Node::Float(0.5)).is_ok());
        assert!(range(0.0, 1.0)("/r", None, &Node::from("x")).is_err());

        assert!(pattern("api-*")("/p", None, &Node::from("api-v1")).is_ok());
        assert!(pattern("api-*")("/p", None, &Node::from("web-v1")).is_err());

        let allowed = one_of(vec![Node::from("debug"), Node::from("info"), Node::Integer(3)]);
        assert!(allowed("/e", None, &Node::from("info")).is_ok());
        assert!(allowed("/e", None, &Node::Float(3.0)).is_ok());
        assert!(allowed("/e", None, &Node::from("trace")).is_err());
        assert!(allowed("/e", None, &Node::Null).is_err());

        assert!(required()("/q", None, &Node::Null).is_err());
        assert!(required()("/q", None, &Node::from("")).is_err());
        assert!(required()("/q", None, &Node::Integer(0)).is_ok());
    }

    #[test]
    fn test_unique_by() {
        let node: Node = serde_json::json!([
            {"id": 1, "name": "a"},
            {"id": 2},
            "not an object",
            {"name": "b"},
            {"id": 1.0}
        ])
        .into();
        let err = unique_by("id")("/users", None, &node).unwrap_err();
        assert!(err.contains("/users[4]"), "{}", err);
        assert!(unique_by("name")("/users", None, &node).is_ok());
        assert!(unique_by("id")("/users", None, &Node::Integer(1)).is_ok());
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("*.example.com", "api.example.com"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }
}
