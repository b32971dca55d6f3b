//! Transport port - バス（Redis / NATS / InMemory）への接続
//!
//! The dispatcher only depends on this capability set. Delivery guarantees
//! belong to the implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ulid::Ulid;

/// A message received on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub id: Ulid,
    pub channel: String,
    pub body: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// Body as text, lossy for non-UTF-8 bytes.
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("transport operation failed: {0}")]
    OperationFailed(String),
}

/// Scoped subscription handle.
///
/// Dropping the handle releases the subscription, so every exit path of a
/// listen loop (return, error, task abort) unsubscribes.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next event. `None` once the subscription is closed.
    async fn next_event(&mut self) -> Option<InboundEvent>;

    fn channel(&self) -> &str;
}

/// Connect / publish / subscribe over the underlying bus.
///
/// # Thread Safety
/// Implementations must accept concurrent `publish` calls from many tasks
/// without external locking.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn publish(&self, channel_id: &str, body: Vec<u8>) -> Result<(), TransportError>;

    async fn subscribe(&self, channel_id: &str) -> Result<Box<dyn Subscription>, TransportError>;
}
