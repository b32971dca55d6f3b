//! MessageCodec - payload と wire bytes の相互変換
//!
//! # Encode
//! 1. publish 側の型があれば、payload がその型のインスタンスか確認
//! 2. serde_json で bytes に変換（キーはソート済み = canonical）
//!
//! # Decode
//! bytes → JSON object。壊れた bytes は `MessageDecodeError`（再送しない）

use crate::domain::errors::{CourierError, InvalidMessageError, MessageDecodeError};
use crate::domain::payload::{JsonMap, Payload};
use crate::domain::schema::PayloadType;

use super::coerce::kind_of;

/// Serialize `payload` for the wire.
///
/// With `expected == Some(ty)` the payload must be a `Typed` instance of
/// `ty.name`; anything else is an `InvalidMessage`.
pub fn encode(payload: &Payload, expected: Option<&PayloadType>) -> Result<Vec<u8>, CourierError> {
    if let Some(ty) = expected
        && payload.type_name() != Some(ty.name.as_str())
    {
        return Err(InvalidMessageError {
            payload: payload.clone(),
            expected_type: ty.name.clone(),
        }
        .into());
    }

    serde_json::to_vec(payload.fields()).map_err(CourierError::Encode)
}

/// Parse an inbound body into a mapping.
pub fn decode(body: &[u8]) -> Result<JsonMap, MessageDecodeError> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(MessageDecodeError::Malformed)?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(MessageDecodeError::NotAnObject(kind_of(&other))),
    }
}
