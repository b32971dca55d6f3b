//! Handler - operation に bind される関数の呼び出し契約
//!
//! # 二層構造
//! - **表層（Typed）**: `Handler<T>` trait - `PayloadModel` を直接受け取る
//! - **内部（Dyn）**: `OperationHandler` trait - object-safe, `Payload` を受け取る
//!
//! A handler answers either immediately or with a deferred computation. Both
//! are one sum type, `HandlerOutput`, so the dispatcher never inspects the
//! result at runtime to decide whether to await it.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::model::{PayloadModel, from_payload};
use crate::domain::errors::HandlerError;
use crate::domain::payload::Payload;

pub type HandlerResult = Result<(), HandlerError>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// What a handler returns.
pub enum HandlerOutput {
    /// Already finished.
    Ready(HandlerResult),
    /// Must be awaited to completion.
    Deferred(HandlerFuture),
}

impl HandlerOutput {
    pub fn deferred<F>(fut: F) -> Self
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        HandlerOutput::Deferred(Box::pin(fut))
    }

    /// Drive the output to its result.
    pub async fn complete(self) -> HandlerResult {
        match self {
            HandlerOutput::Ready(result) => result,
            HandlerOutput::Deferred(fut) => fut.await,
        }
    }
}

impl std::fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerOutput::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            HandlerOutput::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Object-safe handler stored in `OperationBindings`.
pub trait OperationHandler: Send + Sync {
    fn invoke(&self, payload: Payload) -> HandlerOutput;
}

/// Synchronous closure handler. See [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> OperationHandler for FnHandler<F>
where
    F: Fn(Payload) -> HandlerResult + Send + Sync,
{
    fn invoke(&self, payload: Payload) -> HandlerOutput {
        HandlerOutput::Ready((self.f)(payload))
    }
}

/// Wrap a plain function as a handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(Payload) -> HandlerResult + Send + Sync,
{
    FnHandler { f }
}

/// Async closure handler. See [`async_handler_fn`].
pub struct AsyncFnHandler<F> {
    f: F,
}

impl<F, Fut> OperationHandler for AsyncFnHandler<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn invoke(&self, payload: Payload) -> HandlerOutput {
        HandlerOutput::deferred((self.f)(payload))
    }
}

/// Wrap a function returning a future as a handler.
pub fn async_handler_fn<F, Fut>(f: F) -> AsyncFnHandler<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    AsyncFnHandler { f }
}

/// Typed handler: receives the payload already converted into `T`.
///
/// # 使用例
/// ```ignore
/// struct CreateOrder;
///
/// #[async_trait]
/// impl Handler<Order> for CreateOrder {
///     async fn handle(&self, order: Order) -> Result<(), HandlerError> {
///         println!("order {} x{}", order.id, order.qty);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: PayloadModel>: Send + Sync {
    async fn handle(&self, payload: T) -> HandlerResult;
}

/// Type erasure: `Handler<T>` → `OperationHandler`.
pub struct TypedHandler<T: PayloadModel, H: Handler<T>> {
    handler: Arc<H>,
    _marker: PhantomData<fn(T)>,
}

impl<T: PayloadModel, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            _marker: PhantomData,
        }
    }
}

impl<T: PayloadModel, H: Handler<T> + 'static> OperationHandler for TypedHandler<T, H> {
    fn invoke(&self, payload: Payload) -> HandlerOutput {
        let handler = Arc::clone(&self.handler);
        HandlerOutput::deferred(async move {
            let model: T = from_payload(payload)
                .map_err(|e| HandlerError::with_source(format!("cannot build {}", T::TYPE), e))?;
            handler.handle(model).await
        })
    }
}
