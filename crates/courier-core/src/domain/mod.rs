//! Domain model: specification, payload schemas, payloads, errors.

pub mod errors;
pub mod payload;
pub mod schema;
pub mod spec;

pub use self::errors::{
    CourierError, HandlerError, InvalidMessageError, MessageDecodeError,
    PayloadDeserializationError,
};
pub use self::payload::{JsonMap, Payload};
pub use self::schema::{FieldSchema, FieldType, PayloadType};
pub use self::spec::{Channel, Direction, Message, Operation, Specification, operation_for};
