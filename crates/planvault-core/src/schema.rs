//! Plan schema validation.
//!
//! The bundled schema ([`PLAN_SCHEMA`]) requires a string `objectId` and
//! constrains the well-known plan members when they are present. Unknown
//! members are allowed. Deployments can load a different schema with
//! [`JsonSchemaValidator::from_schema`].

use serde_json::Value;
use thiserror::Error;

/// The bundled plan schema (JSON Schema draft 2020-12).
pub const PLAN_SCHEMA: &str = include_str!("../schema/plan.schema.json");

/// Errors raised while building or applying a schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The document violates the schema.
    #[error("document violates schema: {}", violations.join("; "))]
    Violations {
        /// One message per violation.
        violations: Vec<String>,
    },

    /// The schema itself could not be compiled.
    #[error("invalid JSON schema: {message}")]
    InvalidSchema {
        /// Description of the schema error.
        message: String,
    },
}

/// Checks documents against the plan contract.
pub trait SchemaValidator: Send + Sync {
    /// Validates `document`, returning every violation on failure.
    fn validate(&self, document: &Value) -> Result<(), SchemaError>;
}

/// A [`SchemaValidator`] backed by the `jsonschema` crate.
///
/// # Example
///
/// ```
/// use planvault_core::{JsonSchemaValidator, SchemaValidator};
/// use serde_json::json;
///
/// let validator = JsonSchemaValidator::plan().unwrap();
/// assert!(validator.validate(&json!({"objectId": "p1"})).is_ok());
/// assert!(validator.validate(&json!({"planType": "inNetwork"})).is_err());
/// ```
#[derive(Debug)]
pub struct JsonSchemaValidator {
    validator: jsonschema::Validator,
}

impl JsonSchemaValidator {
    /// Compiles the bundled plan schema.
    pub fn plan() -> Result<Self, SchemaError> {
        let schema: Value =
            serde_json::from_str(PLAN_SCHEMA).map_err(|e| SchemaError::InvalidSchema {
                message: e.to_string(),
            })?;
        Self::from_schema(&schema)
    }

    /// Compiles an arbitrary JSON schema.
    pub fn from_schema(schema: &Value) -> Result<Self, SchemaError> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| SchemaError::InvalidSchema {
                message: e.to_string(),
            })?;
        Ok(Self { validator })
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, document: &Value) -> Result<(), SchemaError> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(document)
            .map(|error| error.to_string())
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Violations { violations })
        }
    }
}
