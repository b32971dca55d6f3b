//! FailureLog port - handler 失敗の記録
//!
//! Injected into the dispatcher at construction instead of reaching for a
//! process-wide logger.

use std::sync::Arc;

use crate::domain::errors::HandlerError;

/// Records a recoverable handler failure.
///
/// `excerpt` is already bounded by the dispatcher's configured length.
pub trait FailureLog: Send + Sync {
    fn handler_failed(&self, channel_id: &str, operation_id: &str, excerpt: &str, error: &HandlerError);
}

impl<T: FailureLog + ?Sized> FailureLog for Arc<T> {
    fn handler_failed(&self, channel_id: &str, operation_id: &str, excerpt: &str, error: &HandlerError) {
        (**self).handler_failed(channel_id, operation_id, excerpt, error);
    }
}

/// Emits a `tracing` error event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFailureLog;

impl FailureLog for TracingFailureLog {
    fn handler_failed(&self, channel_id: &str, operation_id: &str, excerpt: &str, error: &HandlerError) {
        tracing::error!(
            channel = channel_id,
            operation = operation_id,
            excerpt,
            error = %error,
            "handler failed"
        );
    }
}

/// Cut `text` to at most `max_chars` characters.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
