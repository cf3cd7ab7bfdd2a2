//! Read transactions and the idle-timeout sweeper (spec §4.5, §5).
//!
//! A `Transaction` pins a root snapshot by holding an `Arc` clone of it —
//! every page reachable from that root stays alive for as long as the
//! transaction does, which is what gives cursors their MVCC isolation.
//! Grounded in `storage/mvcc.rs`'s `CommitTable` (reserve/release lifecycle)
//! and `admin/mvcc.rs`'s `ReaderSnapshot`/slow-reader reporting idiom.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::btree::page::Node;

/// A pinned read snapshot: `(root_reference, revision, creation_timestamp,
/// closed_flag)` (spec §4.5).
pub struct Transaction<K, V> {
    root: Arc<Node<K, V>>,
    revision: u64,
    created_at: Instant,
    closed: AtomicBool,
}

impl<K, V> Transaction<K, V> {
    fn new(root: Arc<Node<K, V>>, revision: u64) -> Arc<Self> {
        Arc::new(Self {
            root,
            revision,
            created_at: Instant::now(),
            closed: AtomicBool::new(false),
        })
    }

    /// The snapshot this transaction pins.
    pub fn root(&self) -> &Arc<Node<K, V>> {
        &self.root
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }

    /// Releases the root reference and marks the transaction closed. Cursor
    /// operations on a closed transaction must fail with
    /// [`crate::error::StrataError::TransactionClosed`].
    pub fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
    }

    fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Snapshot of the reader registry, mirroring the teacher's
/// `ReaderSnapshotReport` shape for diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReaderSnapshot {
    pub active: u64,
    pub oldest_revision: Option<u64>,
    pub max_age_ms: u64,
}

/// FIFO of open read transactions plus an optional background sweeper that
/// force-closes transactions older than the read timeout (spec §4.5).
///
/// The spec describes the FIFO as lock-free MPSC; this uses a
/// `parking_lot::Mutex<VecDeque<_>>` instead, since no lock-free queue crate
/// is part of this project's dependency stack — a deliberate simplification,
/// not a missing feature (see DESIGN.md).
pub struct TransactionRegistry<K, V> {
    queue: Mutex<VecDeque<Arc<Transaction<K, V>>>>,
    read_timeout: Duration,
    sweeper: Mutex<Option<(JoinHandle<()>, Arc<AtomicBool>)>>,
}

impl<K, V> TransactionRegistry<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(read_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            read_timeout,
            sweeper: Mutex::new(None),
        })
    }

    /// Pins `root` at `revision` as a new read transaction and registers it
    /// with the sweeper.
    pub fn open(&self, root: Arc<Node<K, V>>, revision: u64) -> Arc<Transaction<K, V>> {
        let tx = Transaction::new(root, revision);
        self.queue.lock().push_back(tx.clone());
        tx
    }

    /// The oldest revision any open (non-closed) transaction still pins, or
    /// `current_revision` if none are open. Used by the reclaimer to decide
    /// which copied pages are safe to free (spec §9 Open Question 1).
    pub fn min_pinned_revision(&self, current_revision: u64) -> u64 {
        self.queue
            .lock()
            .iter()
            .filter(|tx| !tx.is_closed())
            .map(|tx| tx.revision())
            .min()
            .unwrap_or(current_revision)
    }

    pub fn snapshot(&self) -> ReaderSnapshot {
        let queue = self.queue.lock();
        let mut active = 0u64;
        let mut oldest = None;
        let mut max_age = Duration::ZERO;
        for tx in queue.iter().filter(|tx| !tx.is_closed()) {
            active += 1;
            oldest = Some(oldest.map_or(tx.revision(), |o: u64| o.min(tx.revision())));
            max_age = max_age.max(tx.age());
        }
        ReaderSnapshot {
            active,
            oldest_revision: oldest,
            max_age_ms: max_age.as_millis() as u64,
        }
    }

    /// Peeks and dequeues the FIFO head while it is closed or has exceeded
    /// the read timeout, closing any that are merely stale (spec §4.5).
    fn sweep_once(&self, read_timeout: Duration) {
        loop {
            let mut queue = self.queue.lock();
            let Some(head) = queue.front() else { return };
            if head.is_closed() {
                queue.pop_front();
                continue;
            }
            if read_timeout.is_zero() || head.age() < read_timeout {
                return;
            }
            let stale = queue.pop_front().expect("front already peeked");
            drop(queue);
            warn!(revision = stale.revision(), age_ms = stale.age().as_millis() as u64, "force-closing idle reader");
            stale.close();
        }
    }

    /// Starts the background sweeper thread. A `read_timeout` of zero
    /// disables sweeping (spec §4.5: "≤ 0 disables the sweeper").
    pub fn start_maintenance(self: &Arc<Self>) {
        if self.read_timeout.is_zero() {
            return;
        }
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let registry = self.clone();
        let read_timeout = self.read_timeout;
        let handle = std::thread::Builder::new()
            .name("strata-tx-sweeper".into())
            .spawn(move || {
                while !stop_clone.load(AtomicOrdering::Acquire) {
                    std::thread::sleep(read_timeout);
                    registry.sweep_once(read_timeout);
                }
                debug!("transaction sweeper stopped");
            })
            .expect("spawning the sweeper thread should not fail");
        *guard = Some((handle, stop));
    }

    /// Stops the sweeper thread, blocking until it exits.
    pub fn stop_maintenance(&self) {
        if let Some((handle, stop)) = self.sweeper.lock().take() {
            stop.store(true, AtomicOrdering::Release);
            let _ = handle.join();
        }
    }
}

impl<K, V> Drop for TransactionRegistry<K, V> {
    fn drop(&mut self) {
        if let Some((handle, stop)) = self.sweeper.lock().take() {
            stop.store(true, AtomicOrdering::Release);
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::page::LeafNode;

    fn empty_leaf() -> Arc<Node<i32, i32>> {
        Arc::new(Node::Leaf(LeafNode { revision: 0, keys: vec![], values: vec![] }))
    }

    #[test]
    fn min_pinned_revision_tracks_oldest_open_transaction() {
        let registry = TransactionRegistry::<i32, i32>::new(Duration::from_secs(10));
        let t1 = registry.open(empty_leaf(), 1);
        let _t2 = registry.open(empty_leaf(), 3);
        assert_eq!(registry.min_pinned_revision(5), 1);
        t1.close();
        assert_eq!(registry.min_pinned_revision(5), 3);
    }

    #[test]
    fn min_pinned_revision_falls_back_to_current_when_none_open() {
        let registry = TransactionRegistry::<i32, i32>::new(Duration::from_secs(10));
        assert_eq!(registry.min_pinned_revision(7), 7);
    }

    #[test]
    fn sweep_force_closes_stale_transactions() {
        let registry = TransactionRegistry::<i32, i32>::new(Duration::from_millis(1));
        let tx = registry.open(empty_leaf(), 1);
        std::thread::sleep(Duration::from_millis(5));
        registry.sweep_once(Duration::from_millis(1));
        assert!(tx.is_closed());
    }

    #[test]
    fn zero_timeout_disables_sweeping() {
        let registry = TransactionRegistry::<i32, i32>::new(Duration::ZERO);
        registry.start_maintenance();
        assert!(registry.sweeper.lock().is_none());
    }
}
