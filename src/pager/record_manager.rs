//! Allocates and links pages into logical records, maintains the file
//! header and the registry of managed trees (spec §4.2).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::error::{Result, StrataError};
use crate::pager::cache::PageCache;
use crate::pager::header::{FileHeader, TreeHeaderRecord, FILE_HEADER_LEN};
use crate::pager::page_io::{self, PageIo, NO_NEXT_PAGE};
use crate::primitives::io::FileIo;

use super::free::CopiedPagesLedger;

/// Default number of resident pages the record manager's [`PageCache`] will
/// hold; chosen to absorb a few levels of a typical tree without being
/// sized to any one tree's page budget.
const DEFAULT_CACHE_CAPACITY: usize = 256;

/// A managed tree's registration: its name and the offset of the first page
/// of its (fixed-size, in-place-rewritten) header record chain.
#[derive(Debug, Clone)]
pub struct TreeHandle {
    pub name: String,
    pub header_chain: Vec<u64>,
}

/// File-scoped page allocator, logical-record codec, and tree registry.
pub struct RecordManager {
    io: Arc<dyn FileIo>,
    page_size: usize,
    header: Mutex<FileHeader>,
    trees: Mutex<Vec<TreeHandle>>,
    ledger: Mutex<CopiedPagesLedger>,
    cache: PageCache,
}

impl RecordManager {
    /// Creates a fresh file: writes the header (`nb_trees = 1`, counting the
    /// internal copied-pages bookkeeping tree) and empty free list.
    pub fn create(io: Arc<dyn FileIo>, requested_page_size: u32) -> Result<Self> {
        let page_size = normalize_page_size(requested_page_size);
        let header = FileHeader {
            page_size: page_size as u32,
            nb_trees: 1,
            first_free_page: NO_NEXT_PAGE,
            last_free_page: NO_NEXT_PAGE,
        };
        io.write_at(0, &header.encode())?;
        if io.len()? < page_size as u64 {
            io.truncate(page_size as u64)?;
        }
        info!(page_size, "created record manager file header");
        Ok(Self {
            io,
            page_size,
            header: Mutex::new(header),
            trees: Mutex::new(Vec::new()),
            ledger: Mutex::new(CopiedPagesLedger::new()),
            cache: PageCache::new(DEFAULT_CACHE_CAPACITY),
        })
    }

    /// Opens an existing file: reads the header, then walks the chain of
    /// tree header records starting immediately after it.
    pub fn open(io: Arc<dyn FileIo>) -> Result<Self> {
        let mut buf = [0u8; FILE_HEADER_LEN];
        io.read_at(0, &mut buf)?;
        let header = FileHeader::decode(&buf)?;
        let page_size = header.page_size as usize;

        let mut trees = Vec::new();
        let mut next = if header.nb_trees > 1 { Some(page_size as u64) } else { None };
        let rm_io = io.clone();
        let probe = |offset: u64| -> Result<(TreeHeaderRecord, Vec<u64>)> {
            let chain = chain_offsets(&*rm_io, offset, page_size)?;
            let bytes = read_chain(&*rm_io, &chain, page_size)?;
            Ok((TreeHeaderRecord::decode(&bytes)?, chain))
        };
        while let Some(offset) = next {
            let (record, chain) = probe(offset)?;
            next = if record.next_btree_offset == NO_NEXT_PAGE {
                None
            } else {
                Some(record.next_btree_offset as u64)
            };
            trees.push(TreeHandle {
                name: record.name,
                header_chain: chain,
            });
        }
        info!(page_size, nb_trees = header.nb_trees, "opened record manager file");
        Ok(Self {
            io,
            page_size,
            header: Mutex::new(header),
            trees: Mutex::new(trees),
            ledger: Mutex::new(CopiedPagesLedger::new()),
            cache: PageCache::new(DEFAULT_CACHE_CAPACITY),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn io(&self) -> &Arc<dyn FileIo> {
        &self.io
    }

    fn flush_header(&self, header: &FileHeader) -> Result<()> {
        self.io.write_at(0, &header.encode())
    }

    /// Loads a page, consulting [`PageCache`] first (spec §9: "an explicit
    /// cache with a fixed budget... consulted before issuing a
    /// `RecordManager` read"). Populates the cache on a miss.
    fn load_page(&self, offset: u64) -> Result<PageIo> {
        if let Some(bytes) = self.cache.get(offset) {
            trace!(offset, "page cache hit");
            return Ok(PageIo::from_disk(offset, bytes.to_vec()));
        }
        let page = PageIo::load(&*self.io, offset, self.page_size)?;
        self.cache.insert(offset, Arc::from(page.raw().to_vec()));
        Ok(page)
    }

    /// Flushes a page and invalidates its cache entry, so the next
    /// [`load_page`](Self::load_page) call re-reads the fresh bytes rather
    /// than serving the pre-write copy.
    fn flush_page(&self, page: &mut PageIo) -> Result<()> {
        let offset = page.offset();
        page.flush(&*self.io)?;
        if let Some(offset) = offset {
            self.cache.invalidate(offset);
        }
        Ok(())
    }

    /// Allocates `count` page offsets, preferring the free list before
    /// appending fresh pages at end-of-file.
    fn allocate_pages(&self, count: usize) -> Result<Vec<u64>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut header = self.header.lock();
        let mut offsets = Vec::with_capacity(count);
        while offsets.len() < count && header.first_free_page != NO_NEXT_PAGE {
            let offset = header.first_free_page as u64;
            let page = self.load_page(offset)?;
            header.first_free_page = page.next_page().map(|v| v as i64).unwrap_or(NO_NEXT_PAGE);
            if header.first_free_page == NO_NEXT_PAGE {
                header.last_free_page = NO_NEXT_PAGE;
            }
            offsets.push(offset);
        }
        if offsets.len() < count {
            let mut eof = self.io.len()?;
            if eof < self.page_size as u64 {
                eof = self.page_size as u64;
            }
            let remaining = count - offsets.len();
            for i in 0..remaining {
                offsets.push(eof + (i * self.page_size) as u64);
            }
            self.io.truncate(eof + (remaining * self.page_size) as u64)?;
        }
        self.flush_header(&header)?;
        trace!(count, ?offsets, "allocated pages");
        Ok(offsets)
    }

    /// Writes `payload` as a logical record across freshly allocated pages
    /// and returns the offset of the first page.
    pub fn write_record(&self, payload: &[u8]) -> Result<u64> {
        let nb_pages = page_io::pages_needed(self.page_size, payload.len());
        let offsets = self.allocate_pages(nb_pages)?;
        self.write_record_at(&offsets, payload)?;
        Ok(offsets[0])
    }

    /// Rewrites `payload` onto an already-allocated page chain. The chain
    /// must have been sized to hold `payload`'s length (used for in-place
    /// tree-header rewrites, whose size never changes after creation).
    fn write_record_at(&self, offsets: &[u64], payload: &[u8]) -> Result<()> {
        let mut cursor = 0usize;
        for (i, &offset) in offsets.iter().enumerate() {
            let is_first = i == 0;
            let mut page = PageIo::fresh(self.page_size);
            page.set_offset(offset);
            if is_first {
                page.set_payload_size(payload.len() as u32);
            }
            let cap = page_io::body_capacity(self.page_size, is_first);
            let take = cap.min(payload.len() - cursor);
            page.body_mut(is_first)[..take].copy_from_slice(&payload[cursor..cursor + take]);
            cursor += take;
            let next = offsets.get(i + 1).copied();
            page.set_next_page(next);
            self.flush_page(&mut page)?;
        }
        debug_assert_eq!(cursor, payload.len());
        Ok(())
    }

    /// Reads back a logical record given the offset of its first page.
    pub fn read_record(&self, first_offset: u64) -> Result<Vec<u8>> {
        let first = self.load_page(first_offset)?;
        let payload_len = first.payload_size() as usize;
        let mut out = Vec::with_capacity(payload_len);
        out.extend_from_slice(&first.body(true)[..payload_len.min(first.body(true).len())]);
        let mut next = first.next_page();
        while out.len() < payload_len {
            let offset = next.ok_or_else(|| {
                StrataError::CorruptPage("logical record chain ended before payload_size consumed".into())
            })?;
            let page = self.load_page(offset)?;
            let remaining = payload_len - out.len();
            let body = page.body(false);
            let take = remaining.min(body.len());
            out.extend_from_slice(&body[..take]);
            next = page.next_page();
        }
        Ok(out)
    }

    /// Returns the offsets freed at `revision` to the real free list; called
    /// once no live transaction can still observe that revision.
    pub fn reclaim(&self, min_pinned_revision: u64) -> Result<usize> {
        let reclaimable = self.ledger.lock().drain_below(min_pinned_revision);
        let count = reclaimable.len();
        if reclaimable.is_empty() {
            return Ok(0);
        }
        let mut header = self.header.lock();
        for offset in &reclaimable {
            let mut page = self.load_page(*offset)?;
            page.set_next_page(None);
            self.flush_page(&mut page)?;
        }
        // Splice the reclaimed run onto the head of the free list.
        for window in reclaimable.windows(2) {
            let mut page = self.load_page(window[0])?;
            page.set_next_page(Some(window[1]));
            self.flush_page(&mut page)?;
        }
        let mut tail = self.load_page(*reclaimable.last().unwrap())?;
        tail.set_next_page(if header.first_free_page == NO_NEXT_PAGE {
            None
        } else {
            Some(header.first_free_page as u64)
        });
        self.flush_page(&mut tail)?;
        if header.first_free_page == NO_NEXT_PAGE {
            header.last_free_page = *reclaimable.last().unwrap() as i64;
        }
        header.first_free_page = reclaimable[0] as i64;
        self.flush_header(&header)?;
        debug!(count, min_pinned_revision, "reclaimed pages to free list");
        Ok(count)
    }

    /// Records that `offsets` were superseded by a copy-on-write at
    /// `revision`; they become eligible for [`reclaim`](Self::reclaim) once
    /// no transaction can still observe `revision`.
    pub fn mark_superseded(&self, revision: u64, offsets: Vec<u64>) {
        if offsets.is_empty() {
            return;
        }
        self.ledger.lock().push(revision, offsets);
    }

    /// Registers a new tree, writing its header record and linking it into
    /// the chain. Fails with [`StrataError::AlreadyManaged`] if the name is
    /// already registered.
    pub fn register_tree(
        &self,
        name: &str,
        key_codec: &str,
        value_codec: &str,
        page_size: u32,
    ) -> Result<TreeHandle> {
        let mut trees = self.trees.lock();
        if trees.iter().any(|t| t.name == name) {
            return Err(StrataError::AlreadyManaged(name.to_string()));
        }
        let record = TreeHeaderRecord {
            revision: 0,
            nb_elems: 0,
            root_page_offset: NO_NEXT_PAGE,
            next_btree_offset: NO_NEXT_PAGE,
            page_size,
            name: name.to_string(),
            key_serializer_fqcn: key_codec.to_string(),
            value_serializer_fqcn: value_codec.to_string(),
        };
        let bytes = record.encode();
        let nb_pages = page_io::pages_needed(self.page_size, bytes.len());
        let offsets = self.allocate_pages(nb_pages)?;
        self.write_record_at(&offsets, &bytes)?;

        if let Some(last) = trees.last() {
            let mut last_record = self.decode_chain(&last.header_chain)?;
            last_record.next_btree_offset = offsets[0] as i64;
            self.write_record_at(&last.header_chain, &last_record.encode())?;
        }

        let mut header = self.header.lock();
        header.nb_trees += 1;
        self.flush_header(&header)?;
        drop(header);

        let handle = TreeHandle {
            name: name.to_string(),
            header_chain: offsets,
        };
        trees.push(handle.clone());
        info!(name, "registered tree");
        Ok(handle)
    }

    fn decode_chain(&self, chain: &[u64]) -> Result<TreeHeaderRecord> {
        let bytes = read_chain(&*self.io, chain, self.page_size)?;
        TreeHeaderRecord::decode(&bytes)
    }

    /// Looks up a previously registered tree by name.
    pub fn find_tree(&self, name: &str) -> Option<TreeHandle> {
        self.trees.lock().iter().find(|t| t.name == name).cloned()
    }

    pub fn load_tree_header(&self, handle: &TreeHandle) -> Result<TreeHeaderRecord> {
        self.decode_chain(&handle.header_chain)
    }

    /// Rewrites a tree header record in place. The record's variable-length
    /// fields (name, codec FQCNs) never change after registration, so the
    /// record always fits in the same page chain.
    pub fn update_tree_header(&self, handle: &TreeHandle, record: &TreeHeaderRecord) -> Result<()> {
        self.write_record_at(&handle.header_chain, &record.encode())
    }

    /// Flushes all dirty state: each managed tree's header record and the
    /// file header. The BTree layer is responsible for ensuring node pages
    /// were already written before calling this (spec §4.2 "header updates
    /// are written last").
    pub fn checkpoint(&self) -> Result<()> {
        self.io.sync_all()
    }
}

fn normalize_page_size(requested: u32) -> usize {
    let v = requested.max(1);
    let rounded = v.next_power_of_two();
    if rounded < 64 {
        64
    } else {
        rounded as usize
    }
}

fn chain_offsets(io: &dyn FileIo, first_offset: u64, page_size: usize) -> Result<Vec<u64>> {
    let mut offsets = vec![first_offset];
    let mut page = PageIo::load(io, first_offset, page_size)?;
    while let Some(next) = page.next_page() {
        offsets.push(next);
        page = PageIo::load(io, next, page_size)?;
    }
    Ok(offsets)
}

fn read_chain(io: &dyn FileIo, chain: &[u64], page_size: usize) -> Result<Vec<u8>> {
    let first = PageIo::load(io, chain[0], page_size)?;
    let payload_len = first.payload_size() as usize;
    let mut out = Vec::with_capacity(payload_len);
    out.extend_from_slice(first.body(true));
    for &offset in &chain[1..] {
        let page = PageIo::load(io, offset, page_size)?;
        out.extend_from_slice(page.body(false));
    }
    out.truncate(payload_len);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::io::MemFileIo;

    fn manager(page_size: u32) -> RecordManager {
        RecordManager::create(Arc::new(MemFileIo::new()), page_size).unwrap()
    }

    #[test]
    fn page_size_normalizes_to_power_of_two() {
        assert_eq!(normalize_page_size(2), 64);
        assert_eq!(normalize_page_size(100), 128);
        assert_eq!(normalize_page_size(4096), 4096);
    }

    #[test]
    fn load_page_is_served_from_cache_on_a_second_read() {
        let rm = manager(64);
        let offset = rm.write_record(b"hello").unwrap();
        assert_eq!(rm.cache.len(), 0);
        let first = rm.load_page(offset).unwrap();
        assert_eq!(rm.cache.len(), 1);
        let second = rm.load_page(offset).unwrap();
        assert_eq!(first.raw(), second.raw());
    }

    #[test]
    fn rewriting_a_page_invalidates_its_cache_entry() {
        let rm = manager(64);
        let offset = rm.write_record(b"short").unwrap();
        rm.load_page(offset).unwrap();
        assert_eq!(rm.cache.len(), 1);

        rm.mark_superseded(1, vec![offset]);
        rm.reclaim(2).unwrap();
        assert_eq!(rm.cache.len(), 0, "flushing the reclaimed page must drop its stale cache entry");

        let reused_offset = rm.write_record(b"longer payload").unwrap();
        assert_eq!(reused_offset, offset);
        let reloaded = rm.read_record(offset).unwrap();
        assert_eq!(reloaded, b"longer payload");
    }

    #[test]
    fn write_and_read_small_record() {
        let rm = manager(64);
        let payload = b"hello world";
        let offset = rm.write_record(payload).unwrap();
        let read_back = rm.read_record(offset).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn write_and_read_record_spanning_pages() {
        let rm = manager(64);
        let payload: Vec<u8> = (0..500u32).map(|v| (v % 251) as u8).collect();
        let offset = rm.write_record(&payload).unwrap();
        let read_back = rm.read_record(offset).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn freed_pages_are_reused_after_reclaim() {
        let rm = manager(64);
        let offset = rm.write_record(b"short").unwrap();
        rm.mark_superseded(1, vec![offset]);
        rm.reclaim(2).unwrap();
        let next_offset = rm.write_record(b"other").unwrap();
        assert_eq!(next_offset, offset);
    }

    #[test]
    fn reclaim_respects_min_pinned_revision() {
        let rm = manager(64);
        let offset = rm.write_record(b"short").unwrap();
        rm.mark_superseded(5, vec![offset]);
        let reclaimed = rm.reclaim(3).unwrap();
        assert_eq!(reclaimed, 0);
        let reclaimed = rm.reclaim(6).unwrap();
        assert_eq!(reclaimed, 1);
    }

    #[test]
    fn register_and_reopen_tree() {
        let io: Arc<dyn FileIo> = Arc::new(MemFileIo::new());
        let rm = RecordManager::create(io.clone(), 64).unwrap();
        rm.register_tree("people", "long", "string", 64).unwrap();
        let handle = rm.find_tree("people").unwrap();
        let header = rm.load_tree_header(&handle).unwrap();
        assert_eq!(header.name, "people");
        assert_eq!(header.revision, 0);

        let reopened = RecordManager::open(io).unwrap();
        let handle2 = reopened.find_tree("people").unwrap();
        let header2 = reopened.load_tree_header(&handle2).unwrap();
        assert_eq!(header2, header);
    }

    #[test]
    fn registering_duplicate_name_fails() {
        let rm = manager(64);
        rm.register_tree("t", "long", "string", 64).unwrap();
        let err = rm.register_tree("t", "long", "string", 64).unwrap_err();
        assert!(matches!(err, StrataError::AlreadyManaged(_)));
    }

    #[test]
    fn update_tree_header_persists_new_root() {
        let rm = manager(64);
        let handle = rm.register_tree("t", "long", "string", 64).unwrap();
        let mut header = rm.load_tree_header(&handle).unwrap();
        header.revision = 3;
        header.root_page_offset = 999;
        header.nb_elems = 10;
        rm.update_tree_header(&handle, &header).unwrap();
        let reloaded = rm.load_tree_header(&handle).unwrap();
        assert_eq!(reloaded.revision, 3);
        assert_eq!(reloaded.root_page_offset, 999);
        assert_eq!(reloaded.nb_elems, 10);
    }
}
