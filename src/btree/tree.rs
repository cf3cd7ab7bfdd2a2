//! `BTree<K, V, C>` public contract (spec §4.4): the copy-on-write,
//! MVCC-isolated index itself.
//!
//! Grounded in `storage/btree/tree/definition/api.rs`'s public surface and
//! its `AtomicU64` root-pointer pattern, adapted for an in-memory root: the
//! teacher stores a `PageId` offset in the atomic and swaps it with
//! `AtomicOrdering::SeqCst`, which works because a `u64` is itself Copy.
//! An `Arc<Node<K, V>>` is not, and no lock-free atomic-`Arc` crate is part
//! of this project's dependency stack, so the root here is a
//! `parking_lot::RwLock<Arc<Node<K, V>>>` instead: readers take a brief
//! read lock to clone the `Arc` and never block each other or the writer
//! for longer than that clone.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::btree::comparator::{Comparator, NaturalOrder};
use crate::btree::cursor::Cursor;
use crate::btree::internal;
use crate::btree::leaf;
use crate::btree::maintenance;
use crate::btree::page::{
    search_slice, DeleteResult, InsertResult, InternalNode, LeafNode, Node, SearchResult,
};
use crate::btree::stats::{BTreeStats, BTreeStatsSnapshot};
use crate::btree::transaction::{ReaderSnapshot, TransactionRegistry};

const DEFAULT_PAGE_SIZE: usize = 16;
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalizes a requested page size (spec §4.4 "Page-size normalization"):
/// sizes of 2 or fewer fall back to the default; everything else rounds up
/// to the next power of two.
pub fn normalize_page_size(requested: usize) -> usize {
    if requested <= 2 {
        DEFAULT_PAGE_SIZE
    } else {
        requested.next_power_of_two()
    }
}

/// Tuning knobs for a [`BTree`] (spec §4.4, §4.5).
#[derive(Debug, Clone)]
pub struct BTreeOptions {
    pub page_size: usize,
    pub read_timeout: Duration,
}

impl Default for BTreeOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl BTreeOptions {
    /// The default preset: page size 16, a 10s reader idle timeout.
    pub fn balanced() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: normalize_page_size(page_size),
            ..Self::default()
        }
    }
}

/// A copy-on-write, MVCC B+Tree. Every successful mutation publishes a new
/// immutable root at a new revision; readers already in flight keep seeing
/// the root they started with (spec §3, §5).
pub struct BTree<K, V, C = NaturalOrder<K>> {
    root: RwLock<Arc<Node<K, V>>>,
    write_lock: Mutex<()>,
    revision: AtomicU64,
    nb_elems: AtomicU64,
    page_size: usize,
    comparator: C,
    stats: BTreeStats,
    readers: Arc<TransactionRegistry<K, V>>,
}

impl<K, V> BTree<K, V, NaturalOrder<K>>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// A tree ordered by `K`'s own [`Ord`] implementation.
    pub fn new(options: BTreeOptions) -> Self {
        Self::with_comparator(options, NaturalOrder::new())
    }
}

impl<K, V, C> BTree<K, V, C>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: Comparator<K> + Clone,
{
    /// A tree ordered by an explicit comparator plug-in (spec §1: "the core
    /// consumes a total-order contract").
    pub fn with_comparator(options: BTreeOptions, comparator: C) -> Self {
        let page_size = normalize_page_size(options.page_size);
        let readers = TransactionRegistry::new(options.read_timeout);
        readers.start_maintenance();
        let root = Arc::new(Node::Leaf(LeafNode {
            revision: 0,
            keys: vec![],
            values: vec![],
        }));
        debug!(page_size, "btree initialized");
        Self {
            root: RwLock::new(root),
            write_lock: Mutex::new(()),
            revision: AtomicU64::new(0),
            nb_elems: AtomicU64::new(0),
            page_size,
            comparator,
            stats: BTreeStats::default(),
            readers,
        }
    }

    /// Builds a tree directly from an already-sorted, deduplicated iterator
    /// by packing leaves left-to-right to `page_size` and promoting
    /// boundary keys bottom-up, skipping the per-key insert path entirely.
    pub fn bulk_load(options: BTreeOptions, comparator: C, sorted: impl IntoIterator<Item = (K, V)>) -> Self {
        let page_size = normalize_page_size(options.page_size);
        let mut leaves: Vec<Arc<Node<K, V>>> = Vec::new();
        let mut keys_buf = Vec::with_capacity(page_size);
        let mut vals_buf = Vec::with_capacity(page_size);
        let mut count: u64 = 0;
        for (k, v) in sorted {
            keys_buf.push(k);
            vals_buf.push(v);
            count += 1;
            if keys_buf.len() == page_size {
                leaves.push(Arc::new(Node::Leaf(LeafNode {
                    revision: 0,
                    keys: std::mem::replace(&mut keys_buf, Vec::with_capacity(page_size)),
                    values: std::mem::replace(&mut vals_buf, Vec::with_capacity(page_size)),
                })));
            }
        }
        if !keys_buf.is_empty() {
            leaves.push(Arc::new(Node::Leaf(LeafNode {
                revision: 0,
                keys: keys_buf,
                values: vals_buf,
            })));
        }
        let root = if leaves.is_empty() {
            Arc::new(Node::Leaf(LeafNode {
                revision: 0,
                keys: vec![],
                values: vec![],
            }))
        } else {
            let mut level = leaves;
            while level.len() > 1 {
                level = promote_level(level, page_size);
            }
            level.into_iter().next().expect("level is non-empty")
        };
        let readers = TransactionRegistry::new(options.read_timeout);
        readers.start_maintenance();
        debug!(page_size, count, "btree bulk-loaded");
        Self {
            root: RwLock::new(root),
            write_lock: Mutex::new(()),
            revision: AtomicU64::new(0),
            nb_elems: AtomicU64::new(count),
            page_size,
            comparator,
            stats: BTreeStats::default(),
            readers,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn nb_elems(&self) -> u64 {
        self.nb_elems.load(AtomicOrdering::Relaxed)
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(AtomicOrdering::Acquire)
    }

    pub fn stats(&self) -> BTreeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reader_snapshot(&self) -> ReaderSnapshot {
        self.readers.snapshot()
    }

    /// The oldest revision any open cursor/transaction still pins, or the
    /// current revision if none are open — the bound below which on-disk
    /// pages are safe to reclaim ([`crate::persist::save_tree`]).
    pub fn min_pinned_revision(&self) -> u64 {
        self.readers.min_pinned_revision(self.revision())
    }

    fn current_root(&self) -> Arc<Node<K, V>> {
        self.root.read().clone()
    }

    /// The current root snapshot, for the persistence bridge
    /// ([`crate::persist`]) to walk and serialize.
    pub fn snapshot_root(&self) -> Arc<Node<K, V>> {
        self.current_root()
    }

    /// Rebuilds a tree directly from an already-decoded root, revision, and
    /// element count — used when restoring from disk ([`crate::persist`]),
    /// where the tree shape comes from stored node records rather than
    /// per-key inserts.
    pub fn from_parts(options: BTreeOptions, comparator: C, root: Arc<Node<K, V>>, revision: u64, nb_elems: u64) -> Self {
        let page_size = normalize_page_size(options.page_size);
        let readers = TransactionRegistry::new(options.read_timeout);
        readers.start_maintenance();
        Self {
            root: RwLock::new(root),
            write_lock: Mutex::new(()),
            revision: AtomicU64::new(revision),
            nb_elems: AtomicU64::new(nb_elems),
            page_size,
            comparator,
            stats: BTreeStats::default(),
            readers,
        }
    }

    /// Point lookup; does not register a reader or pin a snapshot, since it
    /// never outlives this call (spec §4.4 `find`).
    pub fn find(&self, key: &K) -> Option<V> {
        self.stats.inc_searches();
        let mut page = self.current_root();
        loop {
            let next = match &*page {
                Node::Leaf(l) => {
                    return match search_slice(&l.keys, key, &self.comparator) {
                        SearchResult::Found(i) => Some(l.values[i].clone()),
                        SearchResult::NotFound(_) => None,
                    };
                }
                Node::Internal(n) => {
                    let idx = match search_slice(&n.keys, key, &self.comparator) {
                        SearchResult::Found(i) => i + 1,
                        SearchResult::NotFound(i) => i,
                    };
                    n.children[idx].clone()
                }
            };
            page = next;
        }
    }

    /// Inserts `(key, value)`, returning the previous value if `key` was
    /// already present (spec §4.4 `insert`). Serialized against other
    /// mutations by `write_lock`; never blocks concurrent readers.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let _write = self.write_lock.lock();
        let revision = self.revision.load(AtomicOrdering::Acquire) + 1;
        let root = self.current_root();
        let result = match &*root {
            Node::Leaf(l) => leaf::insert(l, revision, key, value, &self.comparator, self.page_size),
            Node::Internal(n) => internal::insert(n, revision, key, value, &self.comparator, self.page_size),
        };
        let (new_root, old_value) = match result {
            InsertResult::Modified { new_page, old_value } => (new_page, old_value),
            InsertResult::Split { pivot, left, right } => {
                self.stats.inc_splits();
                trace!(revision, "root split");
                let new_root = Arc::new(Node::Internal(InternalNode {
                    revision,
                    keys: vec![pivot],
                    children: vec![left, right],
                }));
                (new_root, None)
            }
        };
        self.stats.inc_inserts();
        if old_value.is_none() {
            self.nb_elems.fetch_add(1, AtomicOrdering::Relaxed);
        }
        self.publish(new_root, revision);
        old_value
    }

    /// Deletes `key`, returning its value if present (spec §4.4 `delete`).
    /// The root is exempt from the minimum-fill invariant: an underflowing
    /// root leaf is left as-is, and an underflowing root internal node with
    /// zero keys collapses to its one remaining child (spec §4.3.3).
    pub fn delete(&self, key: &K) -> Option<V> {
        let _write = self.write_lock.lock();
        let revision = self.revision.load(AtomicOrdering::Acquire) + 1;
        let root = self.current_root();
        let result = match &*root {
            Node::Leaf(l) => leaf::delete(l, revision, key, &self.comparator),
            Node::Internal(n) => internal::delete(n, revision, key, &self.comparator, self.page_size),
        };
        match result {
            DeleteResult::NotPresent => None,
            DeleteResult::Removed { new_page, removed, .. } => {
                self.stats.inc_deletes();
                self.nb_elems.fetch_sub(1, AtomicOrdering::Relaxed);
                let collapsed = maintenance::collapse_root(new_page);
                self.publish(collapsed, revision);
                Some(removed.1)
            }
            DeleteResult::BorrowedFromSibling { .. } | DeleteResult::MergedWithSibling { .. } => {
                unreachable!("leaf/internal delete never emits these; the root has no parent to resolve against")
            }
        }
    }

    fn publish(&self, new_root: Arc<Node<K, V>>, revision: u64) {
        *self.root.write() = new_root;
        self.revision.store(revision, AtomicOrdering::Release);
        trace!(
            revision,
            min_pinned = self.readers.min_pinned_revision(revision),
            "root published"
        );
    }

    /// A cursor positioned before the smallest key (spec §4.4 `browse`).
    pub fn browse(&self) -> Cursor<K, V, C> {
        let tx = self.readers.open(self.current_root(), self.revision());
        Cursor::at_before_first(tx, self.comparator.clone())
    }

    /// A cursor positioned at `key`, or the smallest key greater than it
    /// (spec §4.4 `browse_from`).
    pub fn browse_from(&self, key: &K) -> Cursor<K, V, C> {
        let tx = self.readers.open(self.current_root(), self.revision());
        Cursor::seeked(tx, key, self.comparator.clone())
    }

    /// Convenience ascending iterator over a fresh snapshot.
    pub fn iter_all(&self) -> impl Iterator<Item = (K, V)> {
        let mut cursor = self.browse();
        std::iter::from_fn(move || cursor.next().ok().flatten())
    }
}

/// One bottom-up promotion pass: groups `children` into runs of up to
/// `page_size + 1` and wraps each run in a fresh internal node, using the
/// leftmost key of every non-first child in the run as a separator.
fn promote_level<K, V>(children: Vec<Arc<Node<K, V>>>, page_size: usize) -> Vec<Arc<Node<K, V>>>
where
    K: Clone,
{
    let mut level = Vec::new();
    let mut iter = children.into_iter();
    loop {
        let group: Vec<Arc<Node<K, V>>> = (&mut iter).take(page_size + 1).collect();
        if group.is_empty() {
            break;
        }
        let keys = group[1..]
            .iter()
            .map(|c| c.leftmost_key().expect("promoted child is never empty").clone())
            .collect();
        level.push(Arc::new(Node::Internal(InternalNode {
            revision: 0,
            keys,
            children: group,
        })));
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::comparator::NaturalOrder;

    fn small_tree() -> BTree<i32, i32> {
        BTree::new(BTreeOptions::with_page_size(4))
    }

    #[test]
    fn insert_then_find_round_trips() {
        let tree = small_tree();
        assert_eq!(tree.insert(1, 10), None);
        assert_eq!(tree.insert(2, 20), None);
        assert_eq!(tree.find(&1), Some(10));
        assert_eq!(tree.find(&2), Some(20));
        assert_eq!(tree.find(&3), None);
    }

    #[test]
    fn reinserting_a_key_overwrites_and_reports_old_value() {
        let tree = small_tree();
        tree.insert(1, 10);
        assert_eq!(tree.insert(1, 99), Some(10));
        assert_eq!(tree.find(&1), Some(99));
        assert_eq!(tree.nb_elems(), 1);
    }

    #[test]
    fn many_inserts_trigger_splits_and_remain_searchable() {
        let tree = small_tree();
        for i in 0..50 {
            tree.insert(i, i * 10);
        }
        assert_eq!(tree.nb_elems(), 50);
        for i in 0..50 {
            assert_eq!(tree.find(&i), Some(i * 10));
        }
        assert!(tree.stats().splits > 0);
    }

    #[test]
    fn delete_then_reinsert_recovers_the_key() {
        let tree = small_tree();
        tree.insert(1, 10);
        assert_eq!(tree.delete(&1), Some(10));
        assert_eq!(tree.find(&1), None);
        assert_eq!(tree.insert(1, 11), None);
        assert_eq!(tree.find(&1), Some(11));
    }

    #[test]
    fn deleting_everything_collapses_back_to_an_empty_root() {
        let tree = small_tree();
        for i in 0..20 {
            tree.insert(i, i);
        }
        for i in 0..20 {
            assert_eq!(tree.delete(&i), Some(i));
        }
        assert_eq!(tree.nb_elems(), 0);
        assert_eq!(tree.find(&0), None);
    }

    #[test]
    fn browse_yields_ascending_order() {
        let tree = small_tree();
        for i in [5, 1, 4, 2, 3] {
            tree.insert(i, i);
        }
        let seen: Vec<i32> = tree.iter_all().map(|(k, _)| k).collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn bulk_load_produces_a_searchable_sorted_tree() {
        let sorted = (0..37).map(|i| (i, i * 2));
        let tree = BTree::bulk_load(BTreeOptions::with_page_size(4), NaturalOrder::new(), sorted);
        assert_eq!(tree.nb_elems(), 37);
        for i in 0..37 {
            assert_eq!(tree.find(&i), Some(i * 2));
        }
        let seen: Vec<i32> = tree.iter_all().map(|(k, _)| k).collect();
        assert_eq!(seen, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn normalize_page_size_rounds_up_and_has_a_floor() {
        assert_eq!(normalize_page_size(0), 16);
        assert_eq!(normalize_page_size(2), 16);
        assert_eq!(normalize_page_size(3), 4);
        assert_eq!(normalize_page_size(17), 32);
    }
}
