//! Dispatch counters.
//!
//! Structured logging goes through `tracing`; these atomics give callers a
//! cheap in-process view of how the mailer is doing without any exporter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for dispatch outcomes.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Messages relayed successfully.
    pub dispatched: AtomicU64,
    /// Dispatch attempts that failed.
    pub failed: AtomicU64,
}

impl DispatchMetrics {
    /// Creates a new counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful dispatch.
    pub fn record_success(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed dispatch.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatch counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages relayed successfully.
    pub dispatched: u64,
    /// Dispatch attempts that failed.
    pub failed: u64,
}

impl MetricsSnapshot {
    /// Returns the dispatch success rate.
    pub fn success_rate(&self) -> f64 {
        let total = self.dispatched + self.failed;
        if total == 0 {
            1.0
        } else {
            self.dispatched as f64 / total as f64
        }
    }
}
