//! Error taxonomy.
//!
//! Only `CourierError::Handler` is recoverable (logged, then republished when
//! enabled). Everything else is structural and ends the processing cycle.

use thiserror::Error;

use super::payload::{JsonMap, Payload};
use super::spec::Direction;
use crate::ports::transport::TransportError;

/// Inbound bytes are not a JSON object.
#[derive(Debug, Error)]
pub enum MessageDecodeError {
    #[error("malformed message body: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("message body must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A mapping does not satisfy the declared payload type.
#[derive(Debug, Error)]
#[error("cannot deserialize mapping into '{type_name}': {reason}")]
pub struct PayloadDeserializationError {
    pub mapping: JsonMap,
    pub type_name: String,
    pub reason: String,
}

/// An outbound payload is not an instance of the channel's publish type.
#[derive(Debug, Error)]
#[error("invalid message {payload}: expected an instance of '{expected_type}'")]
pub struct InvalidMessageError {
    pub payload: Payload,
    pub expected_type: String,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure raised by a bound handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Top-level error for resolution, publishing and listening.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("invalid channel '{0}'")]
    InvalidChannel(String),

    #[error("channel '{channel_id}' declares no {direction} operation")]
    OperationNotDeclared {
        channel_id: String,
        direction: Direction,
    },

    #[error("no handler bound for operation '{operation_id}' on channel '{channel_id}'")]
    OperationIdNotFound {
        channel_id: String,
        operation_id: String,
    },

    #[error(transparent)]
    MessageDecode(#[from] MessageDecodeError),

    #[error(transparent)]
    PayloadDeserialization(#[from] PayloadDeserializationError),

    #[error(transparent)]
    InvalidMessage(#[from] InvalidMessageError),

    #[error("payload encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("handler failed on channel '{channel_id}': {source}")]
    Handler {
        channel_id: String,
        #[source]
        source: HandlerError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The handler failed and republishing the message failed too, e.g. the
    /// channel declares no publish operation.
    #[error("handler failed on channel '{channel_id}' ({handler_error}) and republish failed: {source}")]
    RepublishFailed {
        channel_id: String,
        handler_error: HandlerError,
        #[source]
        source: Box<CourierError>,
    },

    #[error("listener for channel '{channel_id}' panicked: {message}")]
    ListenerPanicked { channel_id: String, message: String },
}

impl CourierError {
    /// Only handler failures go through the republish path.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CourierError::Handler { .. })
    }
}
