//! Typed - payload の型付けと handler 呼び出し
//!
//! - **coerce**: mapping → `Payload`（型検証）
//! - **codec**: `Payload` ⇄ wire bytes
//! - **handler**: `HandlerOutput`, `OperationHandler`, typed `Handler<T>`
//! - **registry**: `OperationBindings`
//! - **model**: `PayloadModel`（Rust 型 ⇄ payload type）

pub mod codec;
pub mod coerce;
pub mod handler;
pub mod model;
pub mod registry;

pub use self::coerce::coerce;
pub use self::handler::{
    Handler, HandlerFuture, HandlerOutput, HandlerResult, OperationHandler, TypedHandler,
    async_handler_fn, handler_fn,
};
pub use self::model::PayloadModel;
pub use self::registry::{BindingError, BindingKey, OperationBindings};
