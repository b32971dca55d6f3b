//! Status - dispatch counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Inbound events taken off a subscription.
    pub received: u64,
    /// Handler calls that succeeded.
    pub handled: u64,
    /// Handler calls that failed (recoverable path).
    pub failed: u64,
    /// Failed messages published back to their channel.
    pub republished: u64,
}

#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    received: AtomicU64,
    handled: AtomicU64,
    failed: AtomicU64,
    republished: AtomicU64,
}

impl DispatchCounters {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_republished(&self) {
        self.republished.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            republished: self.republished.load(Ordering::Relaxed),
        }
    }
}
