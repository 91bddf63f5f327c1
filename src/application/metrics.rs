//! Observability metrics for admission decisions.
//!
//! Provides counters about limiter behavior for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking admission statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Requests forwarded downstream
    requests_allowed: AtomicU64,
    /// Requests rejected with 429
    requests_denied: AtomicU64,
    /// Cool-down periods started
    blocks_triggered: AtomicU64,
    /// Non-numeric counters found (request let through)
    malformed_counters: AtomicU64,
    /// Decisions aborted by a store failure
    store_errors: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                requests_allowed: AtomicU64::new(0),
                requests_denied: AtomicU64::new(0),
                blocks_triggered: AtomicU64::new(0),
                malformed_counters: AtomicU64::new(0),
                store_errors: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.requests_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied(&self) {
        self.inner.requests_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block(&self) {
        self.inner.blocks_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.inner.malformed_counters.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_error(&self) {
        self.inner.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the total number of requests allowed.
    pub fn requests_allowed(&self) -> u64 {
        self.inner.requests_allowed.load(Ordering::Relaxed)
    }

    /// Get the total number of requests denied.
    pub fn requests_denied(&self) -> u64 {
        self.inner.requests_denied.load(Ordering::Relaxed)
    }

    /// Get the number of cool-down periods started.
    pub fn blocks_triggered(&self) -> u64 {
        self.inner.blocks_triggered.load(Ordering::Relaxed)
    }

    /// Get the number of malformed counters encountered.
    pub fn malformed_counters(&self) -> u64 {
        self.inner.malformed_counters.load(Ordering::Relaxed)
    }

    /// Get the number of decisions that failed on the store.
    pub fn store_errors(&self) -> u64 {
        self.inner.store_errors.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_allowed: self.requests_allowed(),
            requests_denied: self.requests_denied(),
            blocks_triggered: self.blocks_triggered(),
            malformed_counters: self.malformed_counters(),
            store_errors: self.store_errors(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.requests_allowed.store(0, Ordering::Relaxed);
        self.inner.requests_denied.store(0, Ordering::Relaxed);
        self.inner.blocks_triggered.store(0, Ordering::Relaxed);
        self.inner.malformed_counters.store(0, Ordering::Relaxed);
        self.inner.store_errors.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Requests forwarded downstream
    pub requests_allowed: u64,
    /// Requests rejected with 429
    pub requests_denied: u64,
    /// Cool-down periods started
    pub blocks_triggered: u64,
    /// Non-numeric counters found
    pub malformed_counters: u64,
    /// Decisions aborted by a store failure
    pub store_errors: u64,
}

impl MetricsSnapshot {
    /// Ratio of denied requests to decided requests (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been decided yet.
    pub fn denial_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.requests_denied as f64 / total as f64
        }
    }

    /// Requests that received a verdict (allowed + denied).
    pub fn total_requests(&self) -> u64 {
        self.requests_allowed.saturating_add(self.requests_denied)
    }
}
