//! OperationBindings - (channel_id, operation_id) → handler
//!
//! 1 つの (channel, operation) に bind できる handler は 1 つだけ。
//! `bind_typed` は `TypedHandler` で包んでから同じ表に入れる。
//!
//! Built during initialization (mutable), then shared read-only behind `Arc`
//! by every listen loop. No locks.

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{Handler, OperationHandler, TypedHandler};
use super::model::PayloadModel;

/// Lookup key: channel id + operation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    pub channel_id: String,
    pub operation_id: String,
}

impl BindingKey {
    pub fn new(channel_id: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            operation_id: operation_id.into(),
        }
    }
}

impl std::fmt::Display for BindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.channel_id, self.operation_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("operation {0} is already bound")]
    AlreadyBound(BindingKey),
}

#[derive(Default)]
pub struct OperationBindings {
    handlers: HashMap<BindingKey, Arc<dyn OperationHandler>>,
}

impl OperationBindings {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Bind a handler. Keys are unique.
    pub fn bind<H: OperationHandler + 'static>(
        &mut self,
        channel_id: impl Into<String>,
        operation_id: impl Into<String>,
        handler: H,
    ) -> Result<(), BindingError> {
        let key = BindingKey::new(channel_id, operation_id);
        if self.handlers.contains_key(&key) {
            return Err(BindingError::AlreadyBound(key));
        }
        self.handlers.insert(key, Arc::new(handler));
        Ok(())
    }

    /// Bind a typed handler; payloads are converted into `T` before the call.
    pub fn bind_typed<T: PayloadModel, H: Handler<T> + 'static>(
        &mut self,
        channel_id: impl Into<String>,
        operation_id: impl Into<String>,
        handler: H,
    ) -> Result<(), BindingError> {
        self.bind(channel_id, operation_id, TypedHandler::<T, H>::new(handler))
    }

    pub fn get(&self, channel_id: &str, operation_id: &str) -> Option<Arc<dyn OperationHandler>> {
        // HashMap<BindingKey, _> cannot be queried with borrowed parts, so build the key.
        self.handlers.get(&BindingKey::new(channel_id, operation_id)).cloned()
    }

    pub fn contains(&self, channel_id: &str, operation_id: &str) -> bool {
        self.handlers.contains_key(&BindingKey::new(channel_id, operation_id))
    }

    /// Bound keys, sorted.
    pub fn keys(&self) -> Vec<BindingKey> {
        let mut keys: Vec<BindingKey> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for OperationBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationBindings")
            .field("keys", &self.keys())
            .finish()
    }
}
