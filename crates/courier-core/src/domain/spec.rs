//! In-memory API description (channels / operations / messages).
//!
//! Parsing and validating the source document is the embedding application's
//! job. This module only holds the result, read-only after construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::schema::PayloadType;

/// Which side of a channel an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Publish,
    Subscribe,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Publish => f.write_str("publish"),
            Direction::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// Message declared on an operation. `payload == None` means untyped passthrough.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadType>,
}

impl Message {
    pub fn typed(payload: PayloadType) -> Self {
        Self {
            payload: Some(payload),
        }
    }

    pub fn untyped() -> Self {
        Self { payload: None }
    }
}

/// A named action on one side of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Handler lookup key (together with the channel id).
    pub operation_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

impl Operation {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    /// Declared payload type, if any.
    pub fn payload_type(&self) -> Option<&PayloadType> {
        self.message.as_ref().and_then(|m| m.payload.as_ref())
    }
}

/// A topic on the bus. Both sides unset is legal; it fails lazily on use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<Operation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Operation>,
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publish(mut self, operation: Operation) -> Self {
        self.publish = Some(operation);
        self
    }

    pub fn with_subscribe(mut self, operation: Operation) -> Self {
        self.subscribe = Some(operation);
        self
    }
}

/// Select the operation for `direction` on `channel`.
pub fn operation_for(channel: &Channel, direction: Direction) -> Option<&Operation> {
    match direction {
        Direction::Publish => channel.publish.as_ref(),
        Direction::Subscribe => channel.subscribe.as_ref(),
    }
}

/// channel_id -> Channel. Ordered so that fan-out order is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    #[serde(default)]
    pub channels: BTreeMap<String, Channel>,
}

impl Specification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>, channel: Channel) -> Self {
        self.channels.insert(channel_id.into(), channel);
        self
    }

    pub fn channel(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.get(channel_id)
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}
