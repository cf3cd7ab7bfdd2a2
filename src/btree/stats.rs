//! Thread-safe operation counters, consulted by tests and tracing, not by
//! the tree itself.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of [`BTreeStats`] at a point in time.
#[derive(Default, Debug, Clone, Copy, serde::Serialize)]
pub struct BTreeStatsSnapshot {
    pub searches: u64,
    pub inserts: u64,
    pub deletes: u64,
    pub splits: u64,
    pub borrows: u64,
    pub merges: u64,
}

/// Operation counters for one [`crate::btree::tree::BTree`].
#[derive(Default)]
pub struct BTreeStats {
    searches: AtomicU64,
    inserts: AtomicU64,
    deletes: AtomicU64,
    splits: AtomicU64,
    borrows: AtomicU64,
    merges: AtomicU64,
}

impl BTreeStats {
    pub fn snapshot(&self) -> BTreeStatsSnapshot {
        BTreeStatsSnapshot {
            searches: self.searches.load(AtomicOrdering::Relaxed),
            inserts: self.inserts.load(AtomicOrdering::Relaxed),
            deletes: self.deletes.load(AtomicOrdering::Relaxed),
            splits: self.splits.load(AtomicOrdering::Relaxed),
            borrows: self.borrows.load(AtomicOrdering::Relaxed),
            merges: self.merges.load(AtomicOrdering::Relaxed),
        }
    }

    pub(crate) fn inc_searches(&self) {
        self.searches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_deletes(&self) {
        self.deletes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_splits(&self) {
        self.splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_borrows(&self) {
        self.borrows.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_merges(&self) {
        self.merges.fetch_add(1, AtomicOrdering::Relaxed);
    }
}
