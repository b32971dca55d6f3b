//! App - アプリケーション層
//!
//! ports と typed を組み合わせて dispatcher を実装します。
//!
//! # 主要コンポーネント
//! - **DispatcherBuilder**: 構築とワイヤリング
//! - **Dispatcher**: connect / publish / publish_json / listen / listen_all
//! - **resolver**: channel + direction → operation
//! - **listen_loop**: 受信ループ（receive→decode→coerce→handle→recover）
//! - **ListenerGroup**: チャンネルごとのループの監督
//! - **DispatchStats**: カウンタ

pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod group;
mod listen_loop;
pub mod resolver;
pub mod status;

pub use self::builder::{BuildError, DispatcherBuilder};
pub use self::config::DispatcherConfig;
pub use self::dispatcher::Dispatcher;
pub use self::group::ListenerGroup;
pub use self::status::DispatchStats;
