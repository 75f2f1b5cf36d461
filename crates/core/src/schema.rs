//! JSON Schema subset validation, output schemas, and structured results.
//!
//! The same validator checks tool-call arguments and structured model
//! output. Supported keywords: `type`, `properties`, `required`, `items`,
//! `enum`, and `additionalProperties: false`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Validate `value` against a JSON Schema subset.
///
/// Returns `Err(message)` describing the first violation found, with a
/// JSON-pointer-like path (`$.suggestion_list[1]`).
pub fn validate_value(value: &serde_json::Value, schema: &serde_json::Value) -> Result<(), String> {
    validate_at("$", value, schema)
}

fn validate_at(path: &str, value: &serde_json::Value, schema: &serde_json::Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(|v| v.as_str()) {
        if !value_matches_type(value, expected) {
            return Err(format!(
                "{path}: expected {expected}, got {}",
                json_type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|v| v.as_array()) {
        if !allowed.contains(value) {
            return Err(format!("{path}: value {value} is not one of the allowed values"));
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
            for field in required.iter().filter_map(|f| f.as_str()) {
                if !obj.contains_key(field) {
                    return Err(format!("{path}: missing required field '{field}'"));
                }
            }
        }

        let properties = schema.get("properties").and_then(|v| v.as_object());
        let closed = schema.get("additionalProperties") == Some(&serde_json::Value::Bool(false));

        for (key, field_value) in obj {
            match properties.and_then(|p| p.get(key)) {
                Some(field_schema) => {
                    validate_at(&format!("{path}.{key}"), field_value, field_schema)?;
                }
                None if closed => {
                    return Err(format!("{path}: unexpected field '{key}'"));
                }
                None => {}
            }
        }
    }

    if let (Some(items), Some(arr)) = (schema.get("items"), value.as_array()) {
        for (i, item) in arr.iter().enumerate() {
            validate_at(&format!("{path}[{i}]"), item, items)?;
        }
    }

    Ok(())
}

fn value_matches_type(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// A named schema for structured model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,

    /// Shown to the model alongside the schema
    #[serde(default)]
    pub description: String,

    /// JSON Schema of the expected object
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }

    /// The learning report: the user's name plus a list of suggestions.
    pub fn report() -> Self {
        Self::new(
            "report",
            "A learning report for the user",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "The user's name" },
                    "suggestion_list": {
                        "type": "array",
                        "description": "Concrete learning suggestions",
                        "items": { "type": "string" }
                    }
                },
                "required": ["name", "suggestion_list"]
            }),
        )
    }

    /// Validate a value against this schema.
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), String> {
        validate_value(value, &self.schema)
    }
}

/// A schema-validated object extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    /// Name of the schema it was validated against
    pub schema_name: String,

    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StructuredResult {
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Convert into a typed record.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.fields.clone()))
    }
}

/// Typed form of [`OutputSchema::report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub name: String,
    pub suggestion_list: Vec<String>,
}
