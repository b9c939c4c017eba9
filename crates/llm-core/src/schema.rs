//! Response Schemas
//!
//! Tool call response types describe themselves through
//! [`schemars::JsonSchema`], so the schema sent to the provider always follows
//! the type's serde shape (renames, optional fields, enums, nested types):
//!
//! ```rust
//! use llm_core::schema::{generate_schema, type_name};
//! use schemars::JsonSchema;
//! use serde::{Deserialize, Serialize};
//!
//! /// Current weather for a city
//! #[derive(Serialize, Deserialize, JsonSchema)]
//! struct Weather {
//!     city: String,
//!     celsius: f64,
//!     note: Option<String>,
//! }
//!
//! let schema = generate_schema::<Weather>();
//! assert_eq!(schema["description"], "Current weather for a city");
//! assert_eq!(type_name::<Weather>(), "Weather");
//! ```
//!
//! Decoded results are re-checked with [`jsonschema`] against a
//! [`CompiledSchema`] built once per tool definition.

use std::sync::Arc;

use jsonschema::{Draft, Validator};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// A type that can be requested from a tool call
pub trait ResponseType: JsonSchema + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> ResponseType for T where
    T: JsonSchema + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Post-processes every generated schema (type name, generated schema)
pub type SchemaHook = Arc<dyn Fn(&str, Value) -> Value + Send + Sync>;

/// Root JSON Schema for `T`, always as an object
pub fn generate_schema<T: JsonSchema>() -> Value {
    match schemars::schema_for!(T).to_value() {
        Value::Bool(true) => json!({}),
        Value::Bool(false) => json!({ "not": {} }),
        schema => schema,
    }
}

/// Name `T` is published under in its schema
pub fn type_name<T: JsonSchema>() -> String {
    T::schema_name().into_owned()
}

/// A JSON Schema document together with its compiled validator
#[derive(Clone)]
pub struct CompiledSchema {
    source: Value,
    validator: Arc<Validator>,
}

impl CompiledSchema {
    /// Compile `schema`; fails when it is not a well-formed schema object
    pub fn compile(schema: Value) -> Result<Self, String> {
        if !schema.is_object() {
            return Err(format!("schema must be a JSON object, got {}", json_kind(&schema)));
        }

        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .should_validate_formats(true)
            .build(&schema)
            .map_err(|e| e.to_string())?;

        Ok(Self {
            source: schema,
            validator: Arc::new(validator),
        })
    }

    /// The schema document as given
    pub fn as_value(&self) -> &Value {
        &self.source
    }

    /// Every violation of `instance` against this schema
    pub fn violations(&self, instance: &Value) -> Vec<SchemaViolation> {
        self.validator
            .iter_errors(instance)
            .map(|err| SchemaViolation {
                path: err.instance_path.to_string(),
                message: err.to_string(),
            })
            .collect()
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CompiledSchema").field(&self.source).finish()
    }
}

/// A single schema violation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value ("" for the root)
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Checks plain data against a tool's schema
pub trait SchemaValidator: Send + Sync {
    /// Returns every violation found, or `Ok(())` when the instance conforms
    fn validate(
        &self,
        instance: &Value,
        schema: &CompiledSchema,
    ) -> Result<(), Vec<SchemaViolation>>;
}

/// Default validator: the compiled `jsonschema` validator of the tool
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(
        &self,
        instance: &Value,
        schema: &CompiledSchema,
    ) -> Result<(), Vec<SchemaViolation>> {
        let violations = schema.violations(instance);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// JSON kind name of a value, used in error messages
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
