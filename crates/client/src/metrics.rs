//! Lifecycle manager counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub(crate) struct CacheMetrics {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) stale: AtomicU64,
    pub(crate) renewals: AtomicU64,
    pub(crate) renewal_failures: AtomicU64,
    pub(crate) coalesced_waits: AtomicU64,
    pub(crate) refresh_cycles: AtomicU64,
    pub(crate) refresh_renewals: AtomicU64,
    pub(crate) refresh_errors: AtomicU64,
}

impl CacheMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            renewals: self.renewals.load(Ordering::Relaxed),
            renewal_failures: self.renewal_failures.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            refresh_cycles: self.refresh_cycles.load(Ordering::Relaxed),
            refresh_renewals: self.refresh_renewals.load(Ordering::Relaxed),
            refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the lifecycle manager's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, bon::Builder)]
pub struct CacheMetricsSnapshot {
    // Foreground lookups
    /// Lookups served from a fresh cached ticket.
    #[builder(default)]
    pub hits: u64,
    /// Lookups that found nothing usable.
    #[builder(default)]
    pub misses: u64,
    /// Lookups that returned a stale ticket after a failed renewal.
    #[builder(default)]
    pub stale: u64,
    /// Lookups that joined a renewal already in flight.
    #[builder(default)]
    pub coalesced_waits: u64,

    // Exchanges
    /// Successful renewal exchanges.
    #[builder(default)]
    pub renewals: u64,
    /// Failed renewal exchanges.
    #[builder(default)]
    pub renewal_failures: u64,

    // Background refresh
    /// Completed background refresh cycles.
    #[builder(default)]
    pub refresh_cycles: u64,
    /// Entries renewed by the background task.
    #[builder(default)]
    pub refresh_renewals: u64,
    /// Renewal failures seen by the background task.
    #[builder(default)]
    pub refresh_errors: u64,
}

impl CacheMetricsSnapshot {
    /// Total exchange attempts (successful and failed).
    #[must_use]
    pub fn exchanges(&self) -> u64 {
        self.renewals + self.renewal_failures
    }
}
