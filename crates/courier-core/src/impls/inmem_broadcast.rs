//! InMemoryBroadcast - 開発用・テスト用の Transport
//!
//! # 実装詳細
//! - channel ごとに購読者の mpsc sender を保持（全購読者に fan-out）
//! - std Mutex で排他制御（ロック中に await しない）
//! - 購読ハンドルの drop で購読者を削除
//! - 購読者がいない channel への publish は捨てられる（broadcast と同じ）

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use ulid::Ulid;

use crate::ports::clock::{Clock, SystemClock};
use crate::ports::transport::{InboundEvent, Subscription, Transport, TransportError};

type Subscribers = HashMap<Ulid, mpsc::UnboundedSender<InboundEvent>>;

#[derive(Default)]
struct Shared {
    channels: Mutex<HashMap<String, Subscribers>>,
    /// Notified whenever a subscription is added or released.
    changed: Notify,
}

impl Shared {
    fn channels(&self) -> MutexGuard<'_, HashMap<String, Subscribers>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, channel: &str, id: Ulid) {
        let mut channels = self.channels();
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
        drop(channels);
        self.changed.notify_waiters();
    }
}

/// In-process pub/sub bus.
///
/// # 使用例
/// ```ignore
/// let bus = Arc::new(InMemoryBroadcast::new());
/// bus.connect().await?;
/// let mut sub = bus.subscribe("orders").await?;
/// bus.publish("orders", b"{}".to_vec()).await?;
/// let event = sub.next_event().await;
/// ```
pub struct InMemoryBroadcast<C = SystemClock> {
    shared: Arc<Shared>,
    connected: AtomicBool,
    clock: C,
}

impl InMemoryBroadcast<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryBroadcast<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryBroadcast<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            connected: AtomicBool::new(false),
            clock,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Live subscriptions on `channel_id`.
    pub fn subscriber_count(&self, channel_id: &str) -> usize {
        self.shared.channels().get(channel_id).map_or(0, HashMap::len)
    }

    /// Wait until `channel_id` has exactly `n` live subscriptions.
    pub async fn wait_for_subscribers(&self, channel_id: &str, n: usize) {
        loop {
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            // register before checking so a concurrent change is not missed
            changed.as_mut().enable();

            if self.subscriber_count(channel_id) == n {
                return;
            }
            changed.await;
        }
    }

    /// End every subscription on `channel_id`; their `next_event()` yields `None`.
    pub fn close(&self, channel_id: &str) {
        self.shared.channels().remove(channel_id);
        self.shared.changed.notify_waiters();
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> Transport for InMemoryBroadcast<C> {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn publish(&self, channel_id: &str, body: Vec<u8>) -> Result<(), TransportError> {
        self.ensure_connected()?;

        let event = InboundEvent {
            id: Ulid::new(),
            channel: channel_id.to_string(),
            body,
            received_at: self.clock.now(),
        };

        let mut channels = self.shared.channels();
        let Some(subscribers) = channels.get_mut(channel_id) else {
            tracing::trace!(channel = channel_id, "no subscribers; message dropped");
            return Ok(());
        };
        // receivers already gone are pruned here
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
        Ok(())
    }

    async fn subscribe(&self, channel_id: &str) -> Result<Box<dyn Subscription>, TransportError> {
        self.ensure_connected()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = Ulid::new();
        self.shared
            .channels()
            .entry(channel_id.to_string())
            .or_default()
            .insert(id, tx);
        self.shared.changed.notify_waiters();

        Ok(Box::new(InMemorySubscription {
            channel: channel_id.to_string(),
            id,
            rx,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Subscription handle; dropping it unsubscribes.
pub struct InMemorySubscription {
    channel: String,
    id: Ulid,
    rx: mpsc::UnboundedReceiver<InboundEvent>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next_event(&mut self) -> Option<InboundEvent> {
        // mpsc::recv is cancel-safe, so this can sit in a select!
        self.rx.recv().await
    }

    fn channel(&self) -> &str {
        &self.channel
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        self.shared.remove(&self.channel, self.id);
    }
}
