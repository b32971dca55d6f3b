//! Message payloads as seen by handlers and publishers.

/// Untyped key-value mapping (a decoded JSON object).
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// A message body, either validated against a `PayloadType` or passed through.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw mapping, exchanged unchanged.
    Untyped { fields: JsonMap },

    /// Instance of the payload type named `type_name`.
    Typed { type_name: String, fields: JsonMap },
}

impl Payload {
    pub fn untyped(fields: JsonMap) -> Self {
        Payload::Untyped { fields }
    }

    pub fn typed(type_name: impl Into<String>, fields: JsonMap) -> Self {
        Payload::Typed {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn fields(&self) -> &JsonMap {
        match self {
            Payload::Untyped { fields } | Payload::Typed { fields, .. } => fields,
        }
    }

    pub fn into_fields(self) -> JsonMap {
        match self {
            Payload::Untyped { fields } | Payload::Typed { fields, .. } => fields,
        }
    }

    /// `None` for untyped payloads.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Payload::Untyped { .. } => None,
            Payload::Typed { type_name, .. } => Some(type_name),
        }
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields().get(field)
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = serde_json::Value::Object(self.fields().clone());
        match self {
            Payload::Untyped { .. } => write!(f, "{body}"),
            Payload::Typed { type_name, .. } => write!(f, "{type_name}{body}"),
        }
    }
}
