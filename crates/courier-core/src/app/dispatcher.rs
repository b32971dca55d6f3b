//! Dispatcher - 公開エントリポイント
//!
//! Holds the specification, the operation bindings, the transport and the
//! failure log. Everything is behind `Arc`, so a `Dispatcher` is cheap to
//! clone into each listen task.

use std::sync::Arc;

use crate::domain::errors::CourierError;
use crate::domain::payload::{JsonMap, Payload};
use crate::domain::schema::PayloadType;
use crate::domain::spec::{Direction, Operation, Specification};
use crate::ports::failure_log::{FailureLog, TracingFailureLog};
use crate::ports::transport::Transport;
use crate::typed::codec;
use crate::typed::coerce::coerce;
use crate::typed::model::{self, PayloadModel};
use crate::typed::registry::OperationBindings;

use super::config::DispatcherConfig;
use super::group::ListenerGroup;
use super::listen_loop;
use super::resolver;
use super::status::{DispatchCounters, DispatchStats};

#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) spec: Arc<Specification>,
    pub(crate) bindings: Arc<OperationBindings>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: DispatcherConfig,
    pub(crate) failure_log: Arc<dyn FailureLog>,
    pub(crate) counters: Arc<DispatchCounters>,
}

impl Dispatcher {
    /// Default config, failures logged through `tracing`.
    /// Use `DispatcherBuilder` for anything else.
    pub fn new(spec: Specification, bindings: OperationBindings, transport: Arc<dyn Transport>) -> Self {
        Self::from_parts(
            spec,
            bindings,
            transport,
            DispatcherConfig::default(),
            Arc::new(TracingFailureLog),
        )
    }

    pub(crate) fn from_parts(
        spec: Specification,
        bindings: OperationBindings,
        transport: Arc<dyn Transport>,
        config: DispatcherConfig,
        failure_log: Arc<dyn FailureLog>,
    ) -> Self {
        Self {
            spec: Arc::new(spec),
            bindings: Arc::new(bindings),
            transport,
            config,
            failure_log,
            counters: Arc::new(DispatchCounters::default()),
        }
    }

    pub fn specification(&self) -> &Specification {
        &self.spec
    }

    pub fn bindings(&self) -> &OperationBindings {
        &self.bindings
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    pub fn resolve(&self, channel_id: &str, direction: Direction) -> Result<&Operation, CourierError> {
        resolver::resolve(&self.spec, channel_id, direction)
    }

    pub fn payload_type(
        &self,
        channel_id: &str,
        direction: Direction,
    ) -> Result<Option<&PayloadType>, CourierError> {
        resolver::payload_type(&self.spec, channel_id, direction)
    }

    pub async fn connect(&self) -> Result<(), CourierError> {
        self.transport.connect().await?;
        tracing::info!(channels = self.spec.channels.len(), "transport connected");
        Ok(())
    }

    /// Encode `payload` against the channel's publish type and send it.
    pub async fn publish(&self, channel_id: &str, payload: &Payload) -> Result<(), CourierError> {
        let expected = self.payload_type(channel_id, Direction::Publish)?;
        let body = codec::encode(payload, expected)?;
        self.transport.publish(channel_id, body).await?;
        tracing::debug!(channel = channel_id, "published");
        Ok(())
    }

    /// Coerce `mapping` into the channel's publish type, then `publish`.
    pub async fn publish_json(&self, channel_id: &str, mapping: JsonMap) -> Result<(), CourierError> {
        let expected = self.payload_type(channel_id, Direction::Publish)?;
        let payload = coerce(mapping, expected)?;
        self.publish(channel_id, &payload).await
    }

    /// Publish a typed model. `T::TYPE` must match the channel's publish type.
    pub async fn publish_model<T: PayloadModel>(&self, channel_id: &str, model: &T) -> Result<(), CourierError> {
        let payload = model::to_payload(model).map_err(CourierError::Encode)?;
        self.publish(channel_id, &payload).await
    }

    /// Run the subscription loop for one channel.
    ///
    /// Returns `Ok(())` only when the transport closes the subscription.
    pub async fn listen(&self, channel_id: &str) -> Result<(), CourierError> {
        listen_loop::run(self, channel_id, None).await
    }

    /// One loop per declared channel; resolves with the first failure.
    pub async fn listen_all(&self) -> Result<(), CourierError> {
        let mut group = self.spawn_all();
        group.join().await
    }

    /// Spawn one loop per declared channel and hand back the group handle.
    pub fn spawn_all(&self) -> ListenerGroup {
        let channel_ids = self.spec.channel_ids().map(str::to_string).collect();
        ListenerGroup::spawn(self.clone(), channel_ids)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channels", &self.spec.channels.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
