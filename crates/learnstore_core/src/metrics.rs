//! Engine operation counters.
//!
//! Counters are atomic and can be read while operations are in progress.
//! They are process-local and start at zero on every open.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals of engine operations.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    index_lookups: AtomicU64,
    batches: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    vacuums: AtomicU64,
    errors: AtomicU64,
}

impl EngineMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_writes(&self, n: u64) {
        self.writes.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_deletes(&self, n: u64) {
        self.deletes.fetch_add(n, Ordering::Relaxed);
    }

    /// Records a full collection scan.
    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_vacuum(&self) {
        self.vacuums.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of point reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of records written.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of records deleted.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of full collection scans.
    ///
    /// High scan counts may indicate a missing index.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Returns the number of index lookups and index scans.
    pub fn index_lookups(&self) -> u64 {
        self.index_lookups.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads: self.reads(),
            writes: self.writes(),
            deletes: self.deletes(),
            scans: self.scans(),
            index_lookups: self.index_lookups(),
            batches: self.batches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            vacuums: self.vacuums.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A copy of [`EngineMetrics`] that can be compared and serialized.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Point reads.
    pub reads: u64,
    /// Records written.
    pub writes: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Full collection scans.
    pub scans: u64,
    /// Index lookups and index scans.
    pub index_lookups: u64,
    /// Batch writes.
    pub batches: u64,
    /// Cache reads that found a live entry.
    pub cache_hits: u64,
    /// Cache reads that found nothing or an expired entry.
    pub cache_misses: u64,
    /// Journal compactions.
    pub vacuums: u64,
    /// Failed operations.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        assert_eq!(EngineMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn counters_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.record_read();
        metrics.record_writes(3);
        metrics.record_cache(true);
        metrics.record_cache(false);
        metrics.record_cache(false);

        let snap = metrics.snapshot();
        assert_eq!(snap.reads, 1);
        assert_eq!(snap.writes, 3);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 2);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(EngineMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_read();
                        m.record_writes(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.reads(), 800);
        assert_eq!(metrics.writes(), 800);
    }
}
