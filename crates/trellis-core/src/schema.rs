//! Argument schemas
//!
//! A [`Schema`] is an opaque, JSON-Schema-shaped describer for the arguments
//! of a context, action, input, or output. The runtime treats it as two
//! capabilities and nothing more: something to hand to a renderer when
//! describing a capability to the model, and a structural validator run
//! before handlers see the arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Validation failure with the offending path in the message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

/// Opaque argument schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    raw: Value,
}

impl Schema {
    /// Wrap a JSON-Schema-shaped value.
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// Shorthand for `{"type": "object", "properties": ..., "required": ...}`.
    pub fn object(properties: Value, required: &[&str]) -> Self {
        Self::new(serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }))
    }

    /// The raw schema document, for renderers.
    pub fn describe(&self) -> &Value {
        &self.raw
    }

    /// Structurally validate a value: type tags, required fields, nested
    /// properties and array items. Unknown keywords are ignored.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        validate_value(&self.raw, value, "$")
    }
}

fn validate_value(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(ty) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(ty, value) {
            return Err(SchemaError(format!(
                "{path}: expected {ty}, got {}",
                type_name(value)
            )));
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if value.get(name).is_none() {
                return Err(SchemaError(format!(
                    "{path}: missing required field '{name}'"
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        if let Some(fields) = value.as_object() {
            for (name, property) in properties {
                if let Some(field) = fields.get(name) {
                    validate_value(property, field, &format!("{path}.{name}"))?;
                }
            }
        }
    }

    if let Some(items) = schema.get("items") {
        if let Some(elements) = value.as_array() {
            for (index, element) in elements.iter().enumerate() {
                validate_value(items, element, &format!("{path}[{index}]"))?;
            }
        }
    }

    Ok(())
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
