//! Cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the store.
    pub hits: u64,
    /// Reads that had to execute the query.
    pub misses: u64,
    /// Reads that fell back to direct execution after a store failure.
    pub bypassed: u64,
    /// Completed namespace invalidations.
    pub invalidations: u64,
    /// Keys deleted across all invalidations.
    pub keys_invalidated: u64,
    /// Invalidations that failed and left the namespace possibly stale.
    pub invalidation_failures: u64,
    /// Operations executed without any cache interaction.
    pub passthrough: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Counters shared by the resolver, invalidator and dispatcher.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    bypassed: AtomicU64,
    invalidations: AtomicU64,
    keys_invalidated: AtomicU64,
    invalidation_failures: AtomicU64,
    passthrough: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bypass(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self, keys: u64) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.keys_invalidated.fetch_add(keys, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation_failure(&self) {
        self.invalidation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_passthrough(&self) {
        self.passthrough.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            keys_invalidated: self.keys_invalidated.load(Ordering::Relaxed),
            invalidation_failures: self.invalidation_failures.load(Ordering::Relaxed),
            passthrough: self.passthrough.load(Ordering::Relaxed),
        }
    }
}
