//! In-memory page representation: immutable once published at a revision
//! (spec §3, §4.3.1). Child references are in-memory `Arc` pointers; the
//! on-disk-offset form of a child reference belongs to the pager layer's
//! node record (see [`crate::pager::header::NodeRecord`]) and is produced
//! only when a tree is persisted.

use std::sync::Arc;

use crate::btree::comparator::Comparator;

/// Outcome of a binary search within one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// `keys[i]` equals the search key.
    Found(usize),
    /// `i` is the insertion index, in `0..=N`.
    NotFound(usize),
}

impl SearchResult {
    pub fn index(self) -> usize {
        match self {
            SearchResult::Found(i) | SearchResult::NotFound(i) => i,
        }
    }
}

/// A leaf page: terminal storage for key/value tuples.
#[derive(Debug)]
pub struct LeafNode<K, V> {
    pub revision: u64,
    pub keys: Vec<K>,
    pub values: Vec<V>,
}

/// An internal page: separator keys plus one more child than keys.
#[derive(Debug)]
pub struct InternalNode<K, V> {
    pub revision: u64,
    pub keys: Vec<K>,
    pub children: Vec<Arc<Node<K, V>>>,
}

/// A B+Tree page, tagged by kind (spec §9: "replace [inheritance] with a
/// tagged variant").
#[derive(Debug)]
pub enum Node<K, V> {
    Leaf(LeafNode<K, V>),
    Internal(InternalNode<K, V>),
}

impl<K, V> Node<K, V> {
    pub fn revision(&self) -> u64 {
        match self {
            Node::Leaf(l) => l.revision,
            Node::Internal(n) => n.revision,
        }
    }

    pub fn nb_elems(&self) -> usize {
        match self {
            Node::Leaf(l) => l.keys.len(),
            Node::Internal(n) => n.keys.len(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn keys(&self) -> &[K] {
        match self {
            Node::Leaf(l) => &l.keys,
            Node::Internal(n) => &n.keys,
        }
    }

    pub fn leftmost_key(&self) -> Option<&K> {
        self.keys().first()
    }

    pub fn rightmost_key(&self) -> Option<&K> {
        self.keys().last()
    }

    /// Binary search for `key` among this page's keys using `comparator`.
    pub fn search<C: Comparator<K>>(&self, key: &K, comparator: &C) -> SearchResult {
        search_slice(self.keys(), key, comparator)
    }
}

/// Binary search shared by leaf and internal pages (spec §4.3.1).
pub fn search_slice<K, C: Comparator<K>>(keys: &[K], key: &K, comparator: &C) -> SearchResult {
    let mut lo = 0usize;
    let mut hi = keys.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match comparator.compare(&keys[mid], key) {
            std::cmp::Ordering::Equal => return SearchResult::Found(mid),
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
        }
    }
    SearchResult::NotFound(lo)
}

/// Outcome of an insert into any page (spec §4.3.2, §4.3.3). The same type
/// is returned at every level of the recursion.
pub enum InsertResult<K, V> {
    Modified {
        new_page: Arc<Node<K, V>>,
        old_value: Option<V>,
    },
    Split {
        pivot: K,
        left: Arc<Node<K, V>>,
        right: Arc<Node<K, V>>,
    },
}

/// Outcome of a delete into any page (spec §4.3.2, §4.3.3).
pub enum DeleteResult<K, V> {
    NotPresent,
    Removed {
        new_page: Arc<Node<K, V>>,
        removed: (K, V),
        /// Set when element 0 was removed, so an ancestor holding an equal
        /// separator key can update it.
        new_leftmost: Option<K>,
    },
    BorrowedFromSibling {
        new_page: Arc<Node<K, V>>,
        new_sibling: Arc<Node<K, V>>,
        removed: (K, V),
        from_right: bool,
    },
    MergedWithSibling {
        new_page: Arc<Node<K, V>>,
        removed: (K, V),
    },
}
