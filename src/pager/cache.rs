//! A bounded cache of resident page bytes keyed by file offset (spec §9:
//! "an explicit cache with a fixed budget, not an opaque runtime reference
//! type"). The authoritative copy is always on disk; eviction just drops
//! the cached bytes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

struct Inner {
    entries: HashMap<u64, Arc<[u8]>>,
    order: VecDeque<u64>,
    capacity: usize,
}

/// A small LRU-ish bounded map from page offset to resident page bytes.
pub struct PageCache {
    inner: Mutex<Inner>,
}

impl PageCache {
    /// Creates a cache holding at most `capacity` resident pages. A
    /// capacity of zero disables caching entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::default(),
                order: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    pub fn get(&self, offset: u64) -> Option<Arc<[u8]>> {
        self.inner.lock().entries.get(&offset).cloned()
    }

    pub fn insert(&self, offset: u64, bytes: Arc<[u8]>) {
        let mut inner = self.inner.lock();
        if inner.capacity == 0 {
            return;
        }
        if inner.entries.insert(offset, bytes).is_none() {
            inner.order.push_back(offset);
            while inner.order.len() > inner.capacity {
                if let Some(evicted) = inner.order.pop_front() {
                    inner.entries.remove(&evicted);
                }
            }
        }
    }

    /// Drops a specific entry, used when a page offset is reclaimed onto
    /// the free list and must not be served stale from cache.
    pub fn invalidate(&self, offset: u64) {
        let mut inner = self.inner.lock();
        inner.entries.remove(&offset);
        inner.order.retain(|&o| o != offset);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
