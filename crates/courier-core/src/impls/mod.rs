//! Impls - ports の実装（開発用・テスト用）
//!
//! 本番用の Transport（Redis, NATS など）は埋め込み側のクレートに置く。

pub mod inmem_broadcast;

pub use self::inmem_broadcast::{InMemoryBroadcast, InMemorySubscription};
