use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_core::app::{Dispatcher, DispatcherBuilder};
use courier_core::domain::{
    Channel, CourierError, Direction, FieldSchema, FieldType, HandlerError, JsonMap, Message,
    Operation, Payload, PayloadType, Specification,
};
use courier_core::impls::InMemoryBroadcast;
use courier_core::ports::{FailureLog, Subscription, Transport};
use courier_core::typed::{HandlerResult, async_handler_fn, handler_fn};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn order_type() -> PayloadType {
    PayloadType::new("Order")
        .with_field(FieldSchema::required("id", FieldType::String))
        .with_field(FieldSchema::required("qty", FieldType::Integer))
}

fn spec() -> Specification {
    Specification::new()
        .with_channel(
            "orders",
            Channel::new()
                .with_publish(Operation::new("send_order").with_message(Message::typed(order_type())))
                .with_subscribe(Operation::new("create_order").with_message(Message::typed(order_type()))),
        )
        .with_channel(
            "feed",
            Channel::new()
                .with_publish(Operation::new("push"))
                .with_subscribe(Operation::new("consume")),
        )
}

fn map(v: serde_json::Value) -> JsonMap {
    v.as_object().cloned().unwrap()
}

async fn connected_bus() -> Arc<InMemoryBroadcast> {
    let bus = Arc::new(InMemoryBroadcast::new());
    bus.connect().await.unwrap();
    bus
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for handler")
        .expect("channel closed")
}

async fn next_body(sub: &mut Box<dyn Subscription>) -> Vec<u8> {
    timeout(WAIT, sub.next_event())
        .await
        .expect("timed out waiting for event")
        .expect("subscription closed")
        .body
}

async fn nothing_more(sub: &mut Box<dyn Subscription>) {
    assert!(timeout(Duration::from_millis(100), sub.next_event()).await.is_err());
}

fn spawn_listen(d: &Dispatcher, channel: &'static str) -> tokio::task::JoinHandle<Result<(), CourierError>> {
    let d = d.clone();
    tokio::spawn(async move { d.listen(channel).await })
}

#[derive(Default)]
struct RecordingFailureLog {
    entries: Mutex<Vec<(String, String, String)>>,
}

impl FailureLog for RecordingFailureLog {
    fn handler_failed(&self, channel_id: &str, _operation_id: &str, excerpt: &str, error: &HandlerError) {
        self.entries.lock().unwrap().push((
            channel_id.to_string(),
            excerpt.to_string(),
            error.message().to_string(),
        ));
    }
}

#[tokio::test]
async fn typed_message_reaches_handler_coerced() {
    let bus = connected_bus().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("orders", "create_order", handler_fn(move |p| {
            tx.send(p).ok();
            Ok(())
        }))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let task = spawn_listen(&d, "orders");
    bus.wait_for_subscribers("orders", 1).await;

    bus.publish("orders", br#"{"id":"a1","qty":3}"#.to_vec()).await.unwrap();

    let payload = recv(&mut rx).await;
    assert_eq!(payload, Payload::typed("Order", map(json!({"id": "a1", "qty": 3}))));

    bus.close("orders");
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    assert_eq!(d.stats().handled, 1);
}

#[tokio::test]
async fn untyped_message_reaches_handler_unchanged() {
    let bus = connected_bus().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("feed", "consume", handler_fn(move |p| {
            tx.send(p).ok();
            Ok(())
        }))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let _task = spawn_listen(&d, "feed");
    bus.wait_for_subscribers("feed", 1).await;

    let body = json!({"nested": {"list": [1, 2.5, null]}, "flag": true, "s": "x"});
    bus.publish("feed", serde_json::to_vec(&body).unwrap()).await.unwrap();

    assert_eq!(recv(&mut rx).await, Payload::untyped(map(body)));
}

#[tokio::test]
async fn missing_field_is_deserialization_error_and_never_republished() {
    let bus = connected_bus().await;
    let calls = Arc::new(AtomicUsize::new(0));

    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("orders", "create_order", handler_fn({
            let calls = Arc::clone(&calls);
            move |_p: Payload| -> HandlerResult {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let mut spy = bus.subscribe("orders").await.unwrap();
    let task = spawn_listen(&d, "orders");
    bus.wait_for_subscribers("orders", 2).await;

    bus.publish("orders", br#"{"id":"a1"}"#.to_vec()).await.unwrap();

    let err = timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();
    match err {
        CourierError::PayloadDeserialization(e) => {
            assert_eq!(e.type_name, "Order");
            assert_eq!(e.mapping, map(json!({"id": "a1"})));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(next_body(&mut spy).await, br#"{"id":"a1"}"#.to_vec());
    nothing_more(&mut spy).await;
    // loop ended, so its subscription is gone; only the spy remains
    assert_eq!(bus.subscriber_count("orders"), 1);
}

#[tokio::test]
async fn malformed_body_is_decode_error_and_never_republished() {
    let bus = connected_bus().await;
    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("feed", "consume", handler_fn(|_p| Ok(())))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let mut spy = bus.subscribe("feed").await.unwrap();
    let task = spawn_listen(&d, "feed");
    bus.wait_for_subscribers("feed", 2).await;

    bus.publish("feed", b"{oops".to_vec()).await.unwrap();

    let err = timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, CourierError::MessageDecode(_)), "{err}");

    next_body(&mut spy).await;
    nothing_more(&mut spy).await;
}

#[tokio::test]
async fn unbound_operation_is_surfaced_not_republished() {
    let bus = connected_bus().await;
    let d = Dispatcher::new(spec(), Default::default(), bus.clone());

    let mut spy = bus.subscribe("orders").await.unwrap();
    let task = spawn_listen(&d, "orders");
    bus.wait_for_subscribers("orders", 2).await;

    bus.publish("orders", br#"{"id":"a1","qty":1}"#.to_vec()).await.unwrap();

    let err = timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(
        err,
        CourierError::OperationIdNotFound { ref channel_id, ref operation_id }
            if channel_id == "orders" && operation_id == "create_order"
    ));

    next_body(&mut spy).await;
    nothing_more(&mut spy).await;
}

#[tokio::test]
async fn handler_failure_republishes_coerced_payload() {
    let bus = connected_bus().await;
    let log = Arc::new(RecordingFailureLog::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("orders", "create_order", handler_fn({
            let calls = Arc::clone(&calls);
            move |p: Payload| -> HandlerResult {
                // fail the first delivery only
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(HandlerError::new("stock service down"));
                }
                tx.send(p).ok();
                Ok(())
            }
        }))
        .unwrap()
        .failure_log(Arc::clone(&log))
        .build(bus.clone())
        .unwrap();

    let mut spy = bus.subscribe("orders").await.unwrap();
    let _task = spawn_listen(&d, "orders");
    bus.wait_for_subscribers("orders", 2).await;

    // extra field is dropped by coercion, so the republished body differs
    bus.publish("orders", br#"{"qty":1,"id":"a2","note":"x"}"#.to_vec())
        .await
        .unwrap();

    assert_eq!(next_body(&mut spy).await, br#"{"qty":1,"id":"a2","note":"x"}"#.to_vec());
    assert_eq!(next_body(&mut spy).await, br#"{"id":"a2","qty":1}"#.to_vec());

    let retried = recv(&mut rx).await;
    assert_eq!(retried, Payload::typed("Order", map(json!({"id": "a2", "qty": 1}))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let entries = log.entries.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec![(
            "orders".to_string(),
            r#"{"qty":1,"id":"a2","note":"x"}"#.to_string(),
            "stock service down".to_string()
        )]
    );

    let stats = d.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.republished, 1);
    assert_eq!(stats.handled, 1);
}

#[tokio::test]
async fn handler_failure_without_republish_terminates_loop() {
    let bus = connected_bus().await;
    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("orders", "create_order", handler_fn(|_p| Err(HandlerError::new("boom"))))
        .unwrap()
        .republish_on_error(false)
        .build(bus.clone())
        .unwrap();

    let mut spy = bus.subscribe("orders").await.unwrap();
    let task = spawn_listen(&d, "orders");
    bus.wait_for_subscribers("orders", 2).await;

    bus.publish("orders", br#"{"id":"a2","qty":1}"#.to_vec()).await.unwrap();

    let err = timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(err, CourierError::Handler { ref channel_id, .. } if channel_id == "orders"));

    next_body(&mut spy).await;
    nothing_more(&mut spy).await;
    assert_eq!(d.stats().republished, 0);
}

#[tokio::test]
async fn failure_log_excerpt_is_bounded() {
    let bus = connected_bus().await;
    let log = Arc::new(RecordingFailureLog::default());

    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("feed", "consume", handler_fn(|_p| Err(HandlerError::new("boom"))))
        .unwrap()
        .republish_on_error(false)
        .failure_log(Arc::clone(&log))
        .build(bus.clone())
        .unwrap();

    let task = spawn_listen(&d, "feed");
    bus.wait_for_subscribers("feed", 1).await;

    let long = "x".repeat(500);
    let body = serde_json::to_vec(&json!({ "blob": long })).unwrap();
    bus.publish("feed", body.clone()).await.unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();

    let entries = log.entries.lock().unwrap();
    let excerpt = &entries[0].1;
    assert_eq!(excerpt.chars().count(), 100);
    assert_eq!(excerpt.as_bytes(), &body[..100]);
}

#[tokio::test]
async fn deferred_handler_completes_before_next_message() {
    let bus = connected_bus().await;
    let trace = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("feed", "consume", async_handler_fn({
            let trace = Arc::clone(&trace);
            move |p: Payload| {
                let trace = Arc::clone(&trace);
                let done_tx = done_tx.clone();
                async move {
                    let n = p.get("n").and_then(|v| v.as_i64()).unwrap_or(-1);
                    trace.lock().unwrap().push(format!("start {n}"));
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    trace.lock().unwrap().push(format!("end {n}"));
                    done_tx.send(n).ok();
                    Ok::<_, HandlerError>(())
                }
            }
        }))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let _task = spawn_listen(&d, "feed");
    bus.wait_for_subscribers("feed", 1).await;

    bus.publish("feed", br#"{"n":1}"#.to_vec()).await.unwrap();
    bus.publish("feed", br#"{"n":2}"#.to_vec()).await.unwrap();

    assert_eq!(recv(&mut done_rx).await, 1);
    assert_eq!(recv(&mut done_rx).await, 2);
    assert_eq!(
        trace.lock().unwrap().as_slice(),
        &["start 1", "end 1", "start 2", "end 2"]
    );
}

#[tokio::test]
async fn listen_unknown_channel_never_subscribes() {
    let bus = connected_bus().await;
    let d = Dispatcher::new(spec(), Default::default(), bus.clone());

    let err = d.listen("unknown_channel").await.unwrap_err();
    assert!(matches!(err, CourierError::InvalidChannel(ref c) if c == "unknown_channel"));
    assert_eq!(bus.subscriber_count("unknown_channel"), 0);
}

#[tokio::test]
async fn listen_all_surfaces_missing_subscribe_operation() {
    let bus = connected_bus().await;
    let spec = spec().with_channel("outbox", Channel::new().with_publish(Operation::new("emit")));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let d = DispatcherBuilder::new()
        .specification(spec)
        .bind("feed", "consume", handler_fn(move |p| {
            tx.send(p).ok();
            Ok(())
        }))
        .unwrap()
        .bind("orders", "create_order", handler_fn(|_p| Ok(())))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let mut group = d.spawn_all();
    assert_eq!(group.len(), 3);
    bus.wait_for_subscribers("feed", 1).await;

    // the healthy loop keeps working on its own
    bus.publish("feed", br#"{"k":"v"}"#.to_vec()).await.unwrap();
    assert_eq!(recv(&mut rx).await, Payload::untyped(map(json!({"k": "v"}))));

    let err = timeout(WAIT, group.join()).await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        CourierError::OperationNotDeclared { ref channel_id, direction: Direction::Subscribe }
            if channel_id == "outbox"
    ));

    // the healthy loops are still running until the group goes away
    assert_eq!(bus.subscriber_count("feed"), 1);
    drop(group);
    timeout(WAIT, bus.wait_for_subscribers("feed", 0)).await.unwrap();
    timeout(WAIT, bus.wait_for_subscribers("orders", 0)).await.unwrap();

    let err = d.listen_all().await.unwrap_err();
    assert!(matches!(err, CourierError::OperationNotDeclared { .. }));
}

#[tokio::test]
async fn shutdown_releases_every_subscription() {
    let bus = connected_bus().await;
    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("feed", "consume", handler_fn(|_p| Ok(())))
        .unwrap()
        .bind("orders", "create_order", handler_fn(|_p| Ok(())))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let group = d.spawn_all();
    bus.wait_for_subscribers("feed", 1).await;
    bus.wait_for_subscribers("orders", 1).await;

    timeout(WAIT, group.shutdown_and_join()).await.unwrap().unwrap();
    assert_eq!(bus.subscriber_count("feed"), 0);
    assert_eq!(bus.subscriber_count("orders"), 0);
}

#[tokio::test]
async fn abort_releases_subscription_mid_processing() {
    let bus = connected_bus().await;
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();

    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("feed", "consume", async_handler_fn(move |_p| {
            let started_tx = started_tx.clone();
            async move {
                started_tx.send(()).ok();
                std::future::pending::<()>().await;
                Ok::<_, HandlerError>(())
            }
        }))
        .unwrap()
        .bind("orders", "create_order", handler_fn(|_p| Ok(())))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let mut group = d.spawn_all();
    bus.wait_for_subscribers("feed", 1).await;
    bus.publish("feed", b"{}".to_vec()).await.unwrap();
    recv(&mut started_rx).await;

    group.abort_all();
    timeout(WAIT, group.join()).await.unwrap().unwrap();
    assert_eq!(bus.subscriber_count("feed"), 0);
    assert_eq!(bus.subscriber_count("orders"), 0);
}

#[tokio::test]
async fn panicking_handler_is_surfaced_by_group() {
    let bus = connected_bus().await;
    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("feed", "consume", handler_fn(|_p| panic!("handler bug")))
        .unwrap()
        .bind("orders", "create_order", handler_fn(|_p| Ok(())))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let mut group = d.spawn_all();
    bus.wait_for_subscribers("feed", 1).await;
    bus.publish("feed", b"{}".to_vec()).await.unwrap();

    let err = timeout(WAIT, group.join()).await.unwrap().unwrap_err();
    assert!(matches!(err, CourierError::ListenerPanicked { ref channel_id, .. } if channel_id == "feed"));
}

#[tokio::test]
async fn publish_json_wrong_shape_sends_no_bytes() {
    let bus = connected_bus().await;
    let d = Dispatcher::new(spec(), Default::default(), bus.clone());
    let mut spy = bus.subscribe("orders").await.unwrap();

    let err = d.publish_json("orders", map(json!({"id": "a1", "qty": "3"}))).await.unwrap_err();
    assert!(matches!(err, CourierError::PayloadDeserialization(_)));

    let err = d
        .publish("orders", &Payload::untyped(map(json!({"id": "a1", "qty": 3}))))
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::InvalidMessage(_)));

    nothing_more(&mut spy).await;
}

#[tokio::test]
async fn handler_failure_on_subscribe_only_channel_cannot_republish() {
    let bus = connected_bus().await;
    let spec = Specification::new().with_channel(
        "orders",
        Channel::new().with_subscribe(Operation::new("create_order").with_message(Message::typed(order_type()))),
    );
    let d = DispatcherBuilder::new()
        .specification(spec)
        .bind("orders", "create_order", handler_fn(|_p| Err(HandlerError::new("stock service down"))))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let mut spy = bus.subscribe("orders").await.unwrap();
    let task = spawn_listen(&d, "orders");
    bus.wait_for_subscribers("orders", 2).await;

    bus.publish("orders", br#"{"id":"a2","qty":1}"#.to_vec()).await.unwrap();

    let err = timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();
    match err {
        CourierError::RepublishFailed {
            channel_id,
            handler_error,
            source,
        } => {
            assert_eq!(channel_id, "orders");
            assert_eq!(handler_error.message(), "stock service down");
            assert!(matches!(
                *source,
                CourierError::OperationNotDeclared { direction: Direction::Publish, .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }

    next_body(&mut spy).await;
    nothing_more(&mut spy).await;
    let stats = d.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.republished, 0);
}

#[tokio::test]
async fn handler_failure_with_mismatched_publish_type_cannot_republish() {
    let bus = connected_bus().await;
    let spec = Specification::new().with_channel(
        "orders",
        Channel::new()
            .with_publish(
                Operation::new("send_receipt")
                    .with_message(Message::typed(PayloadType::new("Receipt").with_field(
                        FieldSchema::required("id", FieldType::String),
                    ))),
            )
            .with_subscribe(Operation::new("create_order").with_message(Message::typed(order_type()))),
    );
    let d = DispatcherBuilder::new()
        .specification(spec)
        .bind("orders", "create_order", handler_fn(|_p| Err(HandlerError::new("boom"))))
        .unwrap()
        .build(bus.clone())
        .unwrap();

    let task = spawn_listen(&d, "orders");
    bus.wait_for_subscribers("orders", 1).await;
    bus.publish("orders", br#"{"id":"a2","qty":1}"#.to_vec()).await.unwrap();

    let err = timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(
        err,
        CourierError::RepublishFailed { ref source, .. } if matches!(**source, CourierError::InvalidMessage(_))
    ));
}

#[tokio::test]
async fn joined_group_can_be_raced_and_still_shut_down() {
    let bus = connected_bus().await;
    let d = DispatcherBuilder::new()
        .specification(spec())
        .bind("orders", "create_order", handler_fn(|_p| Err(HandlerError::new("boom"))))
        .unwrap()
        .bind("feed", "consume", handler_fn(|_p| Ok(())))
        .unwrap()
        .republish_on_error(false)
        .build(bus.clone())
        .unwrap();

    let mut group = d.spawn_all();
    bus.wait_for_subscribers("orders", 1).await;
    bus.wait_for_subscribers("feed", 1).await;

    // nothing has failed yet: join loses the race and can be called again
    tokio::select! {
        _ = group.join() => panic!("no loop should have ended"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }

    bus.publish("orders", br#"{"id":"a2","qty":1}"#.to_vec()).await.unwrap();
    let err = timeout(WAIT, group.join()).await.unwrap().unwrap_err();
    assert!(matches!(err, CourierError::Handler { ref channel_id, .. } if channel_id == "orders"));

    // the feed loop is still alive and stops on request
    assert_eq!(bus.subscriber_count("feed"), 1);
    timeout(WAIT, group.shutdown_and_join()).await.unwrap().unwrap();
    assert_eq!(bus.subscriber_count("feed"), 0);
}
