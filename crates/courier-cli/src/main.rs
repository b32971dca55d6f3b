use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use courier_core::domain::{
    Channel, FieldSchema, FieldType, HandlerError, JsonMap, Message, Operation, Payload,
    PayloadType, Specification,
};
use courier_core::impls::InMemoryBroadcast;
use courier_core::typed::{Handler, HandlerResult, PayloadModel, handler_fn};
use courier_core::app::DispatchStats;
use courier_core::{Dispatcher, DispatcherBuilder, DispatcherConfig};

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    id: String,
    qty: i64,
}

impl PayloadModel for Order {
    const TYPE: &'static str = "Order";
}

/// 最初の n 回はわざと失敗する（republish の様子を見るため）
struct CreateOrder {
    remaining_failures: AtomicU32,
}

impl CreateOrder {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Handler<Order> for CreateOrder {
    async fn handle(&self, order: Order) -> HandlerResult {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(HandlerError::new(format!("intentional failure (left={left})")));
        }

        println!("order {} x{}", order.id, order.qty);
        Ok(())
    }
}

fn specification() -> Specification {
    let order = PayloadType::new(Order::TYPE)
        .with_field(FieldSchema::required("id", FieldType::String))
        .with_field(FieldSchema::required("qty", FieldType::Integer));

    Specification::new()
        .with_channel(
            "orders",
            Channel::new()
                .with_publish(Operation::new("send_order").with_message(Message::typed(order.clone())))
                .with_subscribe(Operation::new("create_order").with_message(Message::typed(order))),
        )
        .with_channel(
            "audit",
            Channel::new()
                .with_publish(Operation::new("record"))
                .with_subscribe(Operation::new("print_audit")),
        )
}

fn print_audit(payload: Payload) -> HandlerResult {
    println!("audit: {payload}");
    Ok(())
}

/// 期待する件数を処理し終えるまで stats をポーリングする
async fn wait_until_handled(dispatcher: &Dispatcher, expected: u64) {
    while dispatcher.stats().handled < expected {
        sleep(Duration::from_millis(20)).await;
    }
}

/// デモ本体：全ループを起動し、publish して、完了・失敗・Ctrl-C のいずれかで止める
async fn run(config: DispatcherConfig) -> Result<DispatchStats, Box<dyn std::error::Error>> {
    let bus = Arc::new(InMemoryBroadcast::new());

    // (B) operation ごとに handler を bind
    let dispatcher = DispatcherBuilder::new()
        .specification(specification())
        .config(config)
        .bind_typed::<Order, _>("orders", "create_order", CreateOrder::new(2))?
        .bind("audit", "print_audit", handler_fn(print_audit))?
        .expect_all_bound()
        .build(bus.clone())?;

    dispatcher.connect().await?;

    // (C) 全チャンネルの受信ループを起動
    let mut group = dispatcher.spawn_all();
    for channel_id in dispatcher.specification().channel_ids() {
        bus.wait_for_subscribers(channel_id, 1).await;
    }

    // (D) publish（typed model と生の mapping）
    dispatcher
        .publish_model(
            "orders",
            &Order {
                id: "a1".into(),
                qty: 3,
            },
        )
        .await?;

    let mut audit = JsonMap::new();
    audit.insert("event".into(), "order_sent".into());
    audit.insert("id".into(), "a1".into());
    dispatcher.publish_json("audit", audit).await?;

    // (E) 処理完了・ループ終了・Ctrl-C のどれかを待つ
    tokio::select! {
        _ = wait_until_handled(&dispatcher, 2) => {}
        // a loop that stops on its own (e.g. republish disabled) ends the demo
        result = group.join() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    group.shutdown_and_join().await?;
    Ok(dispatcher.stats())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) config は COURIER_* 環境変数から
    let config = DispatcherConfig::from_env()?;
    let stats = run(config).await?;
    println!("stats: {}", serde_json::to_string(&stats)?);
    Ok(())
}
