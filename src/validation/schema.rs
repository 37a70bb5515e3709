//! JSON-Schema validation of staged documents.

use serde_json::Value;

use crate::validation::ValidationError;

/// A schema compiled once and reused for every staged document.
pub struct SchemaValidator {
    schema: Value,
    compiled: Option<jsonschema::Validator>,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .field("enforcing", &self.compiled.is_some())
            .finish()
    }
}

impl SchemaValidator {
    /// Compile `schema`. An empty string accepts every document.
    pub fn compile(schema: &str) -> Result<Self, ValidationError> {
        if schema.trim().is_empty() {
            return Ok(Self::permissive());
        }

        let parsed: Value = serde_json::from_str(schema)
            .map_err(|e| ValidationError::Schema(vec![format!("schema is not valid JSON: {}", e)]))?;
        let compiled = jsonschema::validator_for(&parsed)
            .map_err(|e| ValidationError::Schema(vec![format!("schema does not compile: {}", e)]))?;

        Ok(Self {
            schema: parsed,
            compiled: Some(compiled),
        })
    }

    /// A validator that accepts everything.
    pub fn permissive() -> Self {
        Self {
            schema: Value::Object(Default::default()),
            compiled: None,
        }
    }

    /// The parsed schema document (`{}` when permissive).
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate a document, reporting every violation.
    pub fn validate(&self, document: &Value) -> Result<(), ValidationError> {
        let Some(compiled) = &self.compiled else {
            return Ok(());
        };

        let violations: Vec<String> = compiled
            .iter_errors(document)
            .map(|error| {
                let location = error.instance_path.to_string();
                if location.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", location, error)
                }
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Schema(violations))
        }
    }

    /// Parse and validate a document's string form.
    pub fn validate_str(&self, document: &str) -> Result<(), ValidationError> {
        let parsed: Value = serde_json::from_str(document)
            .map_err(|e| ValidationError::Schema(vec![format!("document is not valid JSON: {}", e)]))?;
        self.validate(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &str = r#"{
        "type": "object",
        "properties": {
            "items": {"type": "array", "items": {"type": "integer"}},
            "name": {"type": "string"}
        },
        "required": ["items"]
    }"#;

    #[test]
    fn test_accepts_valid_document() {
        let validator = SchemaValidator::compile(SCHEMA).unwrap();
        assert!(validator.validate(&json!({"items": [1, 2]})).is_ok());
        assert!(validator.validate_str(r#"{"items": []}"#).is_ok());
    }

    #[test]
    fn test_reports_every_violation() {
        let validator = SchemaValidator::compile(SCHEMA).unwrap();
        let err = validator
            .validate(&json!({"items": ["x", 2, "y"], "name": 5}))
            .unwrap_err();
        match err {
            ValidationError::Schema(violations) => assert_eq!(violations.len(), 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_schema_accepts_everything() {
        let validator = SchemaValidator::compile("  ").unwrap();
        assert!(validator.validate(&json!([1, "two", null])).is_ok());
    }

    #[test]
    fn test_bad_schema_is_rejected() {
        assert!(SchemaValidator::compile("{oops").is_err());
        assert!(SchemaValidator::compile(r#"{"type": 12}"#).is_err());
    }
}
