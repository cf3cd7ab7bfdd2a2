//! The "copied-pages" bookkeeping ledger (spec §4.2 free-page reclamation,
//! Open Question 1). Spec describes this as "an in-memory B+Tree keyed by
//! revision, whose values list page offsets freed by that revision" — kept
//! here as a plain ordered map rather than a second on-disk BTree instance,
//! since the ledger itself is never persisted (see DESIGN.md).

use std::collections::BTreeMap;

/// Tracks, per superseding revision, the page offsets a copy-on-write freed.
#[derive(Debug, Default)]
pub struct CopiedPagesLedger {
    by_revision: BTreeMap<u64, Vec<u64>>,
}

impl CopiedPagesLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `offsets` were superseded by the write that produced
    /// `revision`.
    pub fn push(&mut self, revision: u64, offsets: Vec<u64>) {
        self.by_revision.entry(revision).or_default().extend(offsets);
    }

    /// Removes and returns every offset freed at a revision strictly less
    /// than `min_pinned_revision`, in the order their revisions were
    /// recorded. Nothing reachable from a pinned revision is ever returned.
    pub fn drain_below(&mut self, min_pinned_revision: u64) -> Vec<u64> {
        let tail = self.by_revision.split_off(&min_pinned_revision);
        let reclaimable = std::mem::replace(&mut self.by_revision, tail);
        reclaimable.into_values().flatten().collect()
    }

    /// Total number of offsets currently pending reclamation.
    pub fn pending_len(&self) -> usize {
        self.by_revision.values().map(Vec::len).sum()
    }
}
