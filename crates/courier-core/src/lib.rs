//! courier-core
//!
//! Specification-driven pub/sub dispatcher: binds the channels declared in an
//! API description to handler functions, validates payloads against declared
//! types, and republishes messages whose handler failed.
//!
//! # モジュール構成
//! - **domain**: Specification / Channel / Operation / PayloadType / Payload / errors
//! - **typed**: coercion, codec, handler 契約, OperationBindings
//! - **app**: Dispatcher, DispatcherBuilder, listen loop, ListenerGroup
//! - **ports**: Transport, FailureLog, Clock
//! - **impls**: InMemoryBroadcast（開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

pub use crate::app::{Dispatcher, DispatcherBuilder, DispatcherConfig, ListenerGroup};
pub use crate::domain::{CourierError, Payload, Specification};
