//! Ports - 抽象化レイヤー
//!
//! 外部システム（メッセージバス、ログ、時刻）へのインターフェース。
//! 実装は `impls` か埋め込み側のクレートに置く。

pub mod clock;
pub mod failure_log;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::failure_log::{FailureLog, TracingFailureLog};
pub use self::transport::{InboundEvent, Subscription, Transport, TransportError};
