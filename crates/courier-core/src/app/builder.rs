//! DispatcherBuilder - Dispatcher の構築とワイヤリング
//!
//! # 使用例
//! ```ignore
//! let dispatcher = DispatcherBuilder::new()
//!     .specification(spec)
//!     .bind_typed::<Order, _>("orders", "create_order", CreateOrder)?
//!     .republish_on_error(false)
//!     .expect_all_bound()
//!     .build(transport)?;
//! ```
//!
//! # Fail-fast（任意）
//! `expect_all_bound()` を呼ぶと、build() 時に「subscribe 側の全 operation
//! ⊆ bind 済み」をチェックする。呼ばなければ未 bind は受信時に
//! `OperationIdNotFound` として表面化する。

use std::sync::Arc;

use crate::domain::spec::Specification;
use crate::ports::failure_log::{FailureLog, TracingFailureLog};
use crate::ports::transport::Transport;
use crate::typed::handler::{Handler, OperationHandler};
use crate::typed::model::PayloadModel;
use crate::typed::registry::{BindingError, BindingKey, OperationBindings};

use super::config::DispatcherConfig;
use super::dispatcher::Dispatcher;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no specification was provided")]
    MissingSpecification,

    #[error("subscribe operations without a bound handler: {0:?}")]
    UnboundOperations(Vec<BindingKey>),
}

pub struct DispatcherBuilder {
    spec: Option<Specification>,
    bindings: OperationBindings,
    config: DispatcherConfig,
    failure_log: Arc<dyn FailureLog>,
    expect_all_bound: bool,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            spec: None,
            bindings: OperationBindings::new(),
            config: DispatcherConfig::default(),
            failure_log: Arc::new(TracingFailureLog),
            expect_all_bound: false,
        }
    }

    pub fn specification(mut self, spec: Specification) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Replace the bindings collected so far.
    pub fn bindings(mut self, bindings: OperationBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn bind<H: OperationHandler + 'static>(
        mut self,
        channel_id: impl Into<String>,
        operation_id: impl Into<String>,
        handler: H,
    ) -> Result<Self, BindingError> {
        self.bindings.bind(channel_id, operation_id, handler)?;
        Ok(self)
    }

    pub fn bind_typed<T: PayloadModel, H: Handler<T> + 'static>(
        mut self,
        channel_id: impl Into<String>,
        operation_id: impl Into<String>,
        handler: H,
    ) -> Result<Self, BindingError> {
        self.bindings.bind_typed::<T, H>(channel_id, operation_id, handler)?;
        Ok(self)
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn republish_on_error(mut self, enabled: bool) -> Self {
        self.config.republish_on_error = enabled;
        self
    }

    pub fn failure_log(mut self, failure_log: impl FailureLog + 'static) -> Self {
        self.failure_log = Arc::new(failure_log);
        self
    }

    /// Fail `build()` when a declared subscribe operation has no handler.
    pub fn expect_all_bound(mut self) -> Self {
        self.expect_all_bound = true;
        self
    }

    pub fn build(self, transport: Arc<dyn Transport>) -> Result<Dispatcher, BuildError> {
        let spec = self.spec.ok_or(BuildError::MissingSpecification)?;

        if self.expect_all_bound {
            let missing: Vec<BindingKey> = spec
                .channels
                .iter()
                .filter_map(|(channel_id, channel)| {
                    channel
                        .subscribe
                        .as_ref()
                        .map(|op| BindingKey::new(channel_id.as_str(), op.operation_id.as_str()))
                })
                .filter(|key| !self.bindings.contains(&key.channel_id, &key.operation_id))
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::UnboundOperations(missing));
            }
        }

        Ok(Dispatcher::from_parts(
            spec,
            self.bindings,
            transport,
            self.config,
            self.failure_log,
        ))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
