//! Tool Definitions
//!
//! A [`ToolDefinition`] describes one structured output request: the schema
//! handed to the provider's function/tool declaration mechanism and the Rust
//! type the result is decoded into.

use std::fmt;
use std::marker::PhantomData;

use serde_json::Value;

use crate::error::{LlmError, Result};
use crate::schema::{self, CompiledSchema, ResponseType, SchemaHook};

/// Definition of a tool the LLM must answer through
pub struct ToolDefinition<R> {
    name: String,
    schema: CompiledSchema,
    description: Option<String>,
    response_type: PhantomData<fn() -> R>,
}

impl<R: ResponseType> ToolDefinition<R> {
    /// Create a definition from explicit parts. The schema is compiled here,
    /// so a malformed one fails before any request is made.
    pub fn new(
        name: impl Into<String>,
        schema: Value,
        description: Option<String>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LlmError::Configuration("tool name must not be empty".into()));
        }
        let schema = CompiledSchema::compile(schema).map_err(|e| {
            LlmError::Configuration(format!("invalid schema for tool '{name}': {e}"))
        })?;

        Ok(Self {
            name,
            schema,
            description,
            response_type: PhantomData,
        })
    }

    /// Derive every missing part from `R`.
    ///
    /// - schema: generated from `R`, passed through `hook` when given
    /// - name: lower-cased schema name of `R`
    /// - description: the schema's own `description` (the type's doc comment)
    pub fn derive(
        name: Option<String>,
        description: Option<String>,
        schema: Option<Value>,
        hook: Option<&SchemaHook>,
    ) -> Result<Self> {
        let schema = match schema {
            Some(schema) => schema,
            None => {
                let generated = schema::generate_schema::<R>();
                match hook {
                    Some(hook) => hook(&schema::type_name::<R>(), generated),
                    None => generated,
                }
            }
        };

        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| schema::type_name::<R>().to_lowercase());

        let description = description.filter(|d| !d.is_empty()).or_else(|| {
            schema
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        Self::new(name, schema, description)
    }
}

impl<R> ToolDefinition<R> {
    /// Tool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// JSON Schema of the expected response
    pub fn schema(&self) -> &Value {
        self.schema.as_value()
    }

    /// The schema compiled for validation
    pub fn compiled_schema(&self) -> &CompiledSchema {
        &self.schema
    }

    /// Optional description shown to the model
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl<R> Clone for ToolDefinition<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            schema: self.schema.clone(),
            description: self.description.clone(),
            response_type: PhantomData,
        }
    }
}

impl<R> fmt::Debug for ToolDefinition<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("response_type", &std::any::type_name::<R>())
            .field("description", &self.description)
            .field("schema", self.schema.as_value())
            .finish()
    }
}
