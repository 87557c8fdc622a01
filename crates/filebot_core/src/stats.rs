//! Operation counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one [`crate::FileBot`] instance.
///
/// Counters are atomic and may be read while operations are in progress.
#[derive(Debug, Default)]
pub struct OperationStats {
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    reads: AtomicU64,
    index_lookups: AtomicU64,
    scans: AtomicU64,
    validation_failures: AtomicU64,
    rollbacks: AtomicU64,
    errors: AtomicU64,
}

impl OperationStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_create(&self) {
        self.creates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// A lookup on an unindexed field that walked every record.
    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            creates: load(&self.creates),
            updates: load(&self.updates),
            deletes: load(&self.deletes),
            reads: load(&self.reads),
            index_lookups: load(&self.index_lookups),
            scans: load(&self.scans),
            validation_failures: load(&self.validation_failures),
            rollbacks: load(&self.rollbacks),
            errors: load(&self.errors),
        }
    }
}

/// A serializable snapshot of [`OperationStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Records created.
    pub creates: u64,
    /// Records updated.
    pub updates: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Record and field reads.
    pub reads: u64,
    /// Cross-reference lookups.
    pub index_lookups: u64,
    /// Lookups that scanned every record.
    pub scans: u64,
    /// Writes rejected by validation.
    pub validation_failures: u64,
    /// Transactions rolled back after a failed write.
    pub rollbacks: u64,
    /// Operations that failed for any other reason.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = OperationStats::new();
        stats.record_create();
        stats.record_create();
        stats.record_index_lookup();
        stats.record_validation_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.creates, 2);
        assert_eq!(snap.index_lookups, 1);
        assert_eq!(snap.validation_failures, 1);
        assert_eq!(snap.deletes, 0);
    }

    #[test]
    fn concurrent_updates() {
        let stats = Arc::new(OperationStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_read();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.snapshot().reads, 800);
    }
}
