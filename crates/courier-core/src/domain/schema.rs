//! Payload type descriptors.
//!
//! A `PayloadType` is a structural schema: a name plus the fields a message
//! body must (or may) carry. Coercion checks mappings against it and the codec
//! uses its name to decide whether an outbound payload is "an instance of" it.

use serde::{Deserialize, Serialize};

/// JSON shape expected for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    /// Integral numbers only (`3`, not `3.5`).
    Integer,
    /// Any JSON number, integral or not.
    Number,
    Boolean,
    Array,
    Object,
    /// No shape check beyond presence.
    Any,
}

impl FieldType {
    /// Does `value` have this shape?
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => true,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        };
        f.write_str(name)
    }
}

fn default_required() -> bool {
    true
}

/// One declared field of a payload type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: FieldType,

    /// Required fields must be present and non-null.
    #[serde(default = "default_required")]
    pub required: bool,
}

impl FieldSchema {
    pub fn required(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
        }
    }
}

/// Structural schema for a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadType {
    pub name: String,

    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl PayloadType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style: append a field.
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}
