//! PayloadModel trait - Rust 型と payload type の対応付け
//!
//! # 使用例
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Order {
//!     id: String,
//!     qty: i64,
//! }
//!
//! impl PayloadModel for Order {
//!     const TYPE: &'static str = "Order";
//! }
//! ```
//!
//! `TYPE` must equal the `PayloadType::name` declared in the specification.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::payload::Payload;

pub trait PayloadModel: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;
}

/// Wrap a model as a `Typed` payload.
pub fn to_payload<T: PayloadModel>(model: &T) -> Result<Payload, serde_json::Error> {
    match serde_json::to_value(model)? {
        serde_json::Value::Object(fields) => Ok(Payload::typed(T::TYPE, fields)),
        _ => Err(serde::ser::Error::custom(format!(
            "{} must serialize to a JSON object",
            T::TYPE
        ))),
    }
}

/// Rebuild a model from a payload's fields.
pub fn from_payload<T: PayloadModel>(payload: Payload) -> Result<T, serde_json::Error> {
    serde_json::from_value(serde_json::Value::Object(payload.into_fields()))
}
