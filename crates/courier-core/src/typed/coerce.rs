//! Payload coercion - untyped mapping → declared payload type.

use crate::domain::errors::PayloadDeserializationError;
use crate::domain::payload::{JsonMap, Payload};
use crate::domain::schema::PayloadType;

/// Convert `mapping` into an instance of `ty`.
///
/// - `ty == None`: untyped passthrough, the mapping is returned unchanged.
/// - otherwise every required field must be present and non-null and every
///   present declared field must match its `FieldType`. Undeclared fields are
///   dropped from the typed instance.
pub fn coerce(mapping: JsonMap, ty: Option<&PayloadType>) -> Result<Payload, PayloadDeserializationError> {
    let Some(ty) = ty else {
        return Ok(Payload::untyped(mapping));
    };

    let mut fields = JsonMap::new();
    for field in &ty.fields {
        match mapping.get(&field.name) {
            None | Some(serde_json::Value::Null) if field.required => {
                return Err(reject(mapping, ty, format!("missing required field '{}'", field.name)));
            }
            None => {}
            Some(serde_json::Value::Null) => {
                fields.insert(field.name.clone(), serde_json::Value::Null);
            }
            Some(value) if !field.ty.accepts(value) => {
                let reason = format!("field '{}' must be {}, got {}", field.name, field.ty, kind_of(value));
                return Err(reject(mapping, ty, reason));
            }
            Some(value) => {
                fields.insert(field.name.clone(), value.clone());
            }
        }
    }

    Ok(Payload::typed(ty.name.clone(), fields))
}

fn reject(mapping: JsonMap, ty: &PayloadType, reason: String) -> PayloadDeserializationError {
    PayloadDeserializationError {
        mapping,
        type_name: ty.name.clone(),
        reason,
    }
}

pub(crate) fn kind_of(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
