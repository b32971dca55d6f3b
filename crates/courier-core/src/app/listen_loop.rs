//! ListenLoop - チャンネルごとの購読ループ
//!
//! # フロー
//! 1. subscribe 側の operation を解決（失敗したら購読しない）
//! 2. Transport::subscribe() で購読ハンドル取得（drop で解放）
//! 3. next_event() で受信
//! 4. decode → coerce → handler 実行
//! 5. handler 失敗時: ログ → 再送 or 終了

use tokio::sync::watch;

use crate::domain::errors::{CourierError, HandlerError};
use crate::domain::payload::{JsonMap, Payload};
use crate::domain::schema::PayloadType;
use crate::domain::spec::Direction;
use crate::ports::failure_log::excerpt;
use crate::ports::transport::InboundEvent;
use crate::typed::codec;
use crate::typed::coerce::coerce;

use super::dispatcher::Dispatcher;

/// Per-message state, dropped at the end of each cycle.
struct Inflight {
    raw: JsonMap,
    /// Set once coercion succeeded. Republish falls back to `raw` without it.
    coerced: Option<Payload>,
}

/// Run the loop for `channel_id` until the subscription closes, an
/// unrecoverable error occurs, or `shutdown` flips to `true`.
pub(crate) async fn run(
    dispatcher: &Dispatcher,
    channel_id: &str,
    mut shutdown: Option<watch::Receiver<bool>>,
) -> Result<(), CourierError> {
    let operation = dispatcher.resolve(channel_id, Direction::Subscribe)?;
    let operation_id = operation.operation_id.as_str();
    let payload_type = operation.payload_type();

    let mut subscription = dispatcher.transport.subscribe(channel_id).await?;
    tracing::info!(channel = channel_id, operation = operation_id, "subscribed");

    loop {
        let event = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => {
                tracing::info!(channel = channel_id, "shutdown requested");
                break;
            }
            event = subscription.next_event() => event,
        };

        let Some(event) = event else {
            tracing::info!(channel = channel_id, "subscription closed");
            break;
        };

        process(dispatcher, channel_id, operation_id, payload_type, &event).await?;
    }

    Ok(())
}

async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        // sender dropped counts as shutdown too
        Some(rx) => {
            let _ = rx.wait_for(|stop| *stop).await;
        }
        None => std::future::pending().await,
    }
}

async fn process(
    dispatcher: &Dispatcher,
    channel_id: &str,
    operation_id: &str,
    payload_type: Option<&PayloadType>,
    event: &InboundEvent,
) -> Result<(), CourierError> {
    dispatcher.counters.record_received();
    tracing::debug!(channel = channel_id, event_id = %event.id, "received");

    let raw = codec::decode(&event.body)?;
    let coerced = coerce(raw.clone(), payload_type)?;
    let inflight = Inflight {
        raw,
        coerced: Some(coerced),
    };

    let handler = dispatcher
        .bindings
        .get(channel_id, operation_id)
        .ok_or_else(|| CourierError::OperationIdNotFound {
            channel_id: channel_id.to_string(),
            operation_id: operation_id.to_string(),
        })?;

    let argument = match &inflight.coerced {
        Some(payload) => payload.clone(),
        None => Payload::untyped(inflight.raw.clone()),
    };

    match handler.invoke(argument).complete().await {
        Ok(()) => {
            dispatcher.counters.record_handled();
            Ok(())
        }
        Err(error) => recover(dispatcher, channel_id, operation_id, event, inflight, error).await,
    }
}

/// Handler failure: log, then republish or give up.
async fn recover(
    dispatcher: &Dispatcher,
    channel_id: &str,
    operation_id: &str,
    event: &InboundEvent,
    inflight: Inflight,
    error: HandlerError,
) -> Result<(), CourierError> {
    dispatcher.counters.record_failed();

    let text = event.body_text();
    dispatcher.failure_log.handler_failed(
        channel_id,
        operation_id,
        excerpt(&text, dispatcher.config.log_excerpt_len),
        &error,
    );

    if !dispatcher.config.republish_on_error {
        return Err(CourierError::Handler {
            channel_id: channel_id.to_string(),
            source: error,
        });
    }

    let republished = match inflight.coerced {
        Some(payload) => dispatcher.publish(channel_id, &payload).await,
        None => dispatcher.publish_json(channel_id, inflight.raw).await,
    };
    if let Err(cause) = republished {
        return Err(CourierError::RepublishFailed {
            channel_id: channel_id.to_string(),
            handler_error: error,
            source: Box::new(cause),
        });
    }
    dispatcher.counters.record_republished();
    tracing::warn!(channel = channel_id, event_id = %event.id, "republished after handler failure");

    Ok(())
}
