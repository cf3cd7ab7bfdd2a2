//! The physical page: a fixed-size buffer with a next-page link and, on the
//! first page of a logical record, a payload-size field (spec §4.1).

use crate::error::{Result, StrataError};
use crate::primitives::io::FileIo;

/// Offset into the next-page link field.
const NEXT_PAGE_OFFSET: usize = 0;
const NEXT_PAGE_LEN: usize = 8;
/// Offset into the payload-size field, present only on a record's first page.
const PAYLOAD_SIZE_OFFSET: usize = 8;
const PAYLOAD_SIZE_LEN: usize = 4;

/// Minimum framing overhead common to every page (the next-page link).
pub const PAGE_HEADER_LEN: usize = NEXT_PAGE_LEN;
/// Additional framing overhead on a record's first page (the payload size).
pub const FIRST_PAGE_HEADER_LEN: usize = NEXT_PAGE_LEN + PAYLOAD_SIZE_LEN;

/// Sentinel written to the next-page link of the last page of a record.
pub const NO_NEXT_PAGE: i64 = -1;

/// One physical page: `page_size` bytes, loaded from or destined for a
/// specific file offset (or not yet assigned one, if freshly allocated).
///
/// A page carries a dirty flag rather than a three-state enum; "fresh" and
/// "loaded" pages both start clean, "dirty" just tracks whether a flush is
/// owed before the page can be considered durable.
pub struct PageIo {
    offset: Option<u64>,
    buf: Vec<u8>,
    dirty: bool,
}

impl PageIo {
    /// Builds a zeroed page not yet assigned a file offset. The next-page
    /// link is initialized to [`NO_NEXT_PAGE`], not left zeroed, so a fresh
    /// page reads back as having no successor rather than a successor at
    /// offset 0.
    pub fn fresh(page_size: usize) -> Self {
        let mut page = Self {
            offset: None,
            buf: vec![0u8; page_size],
            dirty: true,
        };
        page.set_next_page(None);
        page
    }

    /// Wraps bytes already read from disk at `offset`.
    pub fn from_disk(offset: u64, buf: Vec<u8>) -> Self {
        Self {
            offset: Some(offset),
            buf,
            dirty: false,
        }
    }

    /// Reads a single page at `offset` from `io`.
    pub fn load(io: &dyn FileIo, offset: u64, page_size: usize) -> Result<Self> {
        let mut buf = vec![0u8; page_size];
        io.read_at(offset, &mut buf)?;
        Ok(Self::from_disk(offset, buf))
    }

    /// The page's file offset, if it has ever been flushed.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Assigns the page's destination offset (used when appending at EOF).
    pub fn set_offset(&mut self, offset: u64) {
        self.offset = Some(offset);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn page_size(&self) -> usize {
        self.buf.len()
    }

    /// Flushes the page to `offset` (if unset, the page must be assigned one
    /// first) and clears the dirty flag.
    pub fn flush(&mut self, io: &dyn FileIo) -> Result<()> {
        let offset = self
            .offset
            .ok_or_else(|| StrataError::InvalidArgument("page has no destination offset".into()))?;
        io.write_at(offset, &self.buf)?;
        self.dirty = false;
        Ok(())
    }

    pub fn next_page(&self) -> Option<u64> {
        let raw = i64::from_be_bytes(self.buf[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + NEXT_PAGE_LEN].try_into().unwrap());
        if raw == NO_NEXT_PAGE {
            None
        } else {
            Some(raw as u64)
        }
    }

    pub fn set_next_page(&mut self, next: Option<u64>) {
        let raw = next.map(|v| v as i64).unwrap_or(NO_NEXT_PAGE);
        self.buf[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + NEXT_PAGE_LEN].copy_from_slice(&raw.to_be_bytes());
        self.dirty = true;
    }

    /// Reads the payload-size field. Only meaningful on a record's first page.
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(
            self.buf[PAYLOAD_SIZE_OFFSET..PAYLOAD_SIZE_OFFSET + PAYLOAD_SIZE_LEN]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_payload_size(&mut self, size: u32) {
        self.buf[PAYLOAD_SIZE_OFFSET..PAYLOAD_SIZE_OFFSET + PAYLOAD_SIZE_LEN]
            .copy_from_slice(&size.to_be_bytes());
        self.dirty = true;
    }

    /// The payload-carrying slice of this page, given whether it is the
    /// first page of its record (first pages reserve 12 bytes of framing,
    /// continuations reserve 8).
    pub fn body(&self, is_first: bool) -> &[u8] {
        let start = if is_first { FIRST_PAGE_HEADER_LEN } else { PAGE_HEADER_LEN };
        &self.buf[start..]
    }

    pub fn body_mut(&mut self, is_first: bool) -> &mut [u8] {
        let start = if is_first { FIRST_PAGE_HEADER_LEN } else { PAGE_HEADER_LEN };
        self.dirty = true;
        &mut self.buf[start..]
    }

    /// The raw page bytes, header included, for diagnostics or cache storage.
    pub fn raw(&self) -> &[u8] {
        &self.buf
    }
}

/// How many payload bytes a page of `page_size` can carry, for the first
/// page of a record versus a continuation page.
pub fn body_capacity(page_size: usize, is_first: bool) -> usize {
    page_size - if is_first { FIRST_PAGE_HEADER_LEN } else { PAGE_HEADER_LEN }
}

/// Number of pages needed to store a record of `payload_len` bytes.
pub fn pages_needed(page_size: usize, payload_len: usize) -> usize {
    let first_cap = body_capacity(page_size, true);
    if payload_len <= first_cap {
        return 1;
    }
    let rest_cap = body_capacity(page_size, false);
    let remaining = payload_len - first_cap;
    1 + remaining.div_ceil(rest_cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::io::MemFileIo;

    #[test]
    fn fresh_page_has_no_next_and_zero_payload() {
        let page = PageIo::fresh(64);
        assert_eq!(page.next_page(), None);
        assert_eq!(page.payload_size(), 0);
        assert!(page.is_dirty());
    }

    #[test]
    fn next_page_roundtrip() {
        let mut page = PageIo::fresh(64);
        page.set_next_page(Some(128));
        assert_eq!(page.next_page(), Some(128));
        page.set_next_page(None);
        assert_eq!(page.next_page(), None);
    }

    #[test]
    fn body_capacity_accounts_for_framing() {
        assert_eq!(body_capacity(64, true), 64 - 12);
        assert_eq!(body_capacity(64, false), 64 - 8);
    }

    #[test]
    fn pages_needed_single_vs_chained() {
        assert_eq!(pages_needed(64, 0), 1);
        assert_eq!(pages_needed(64, body_capacity(64, true)), 1);
        assert_eq!(pages_needed(64, body_capacity(64, true) + 1), 2);
    }

    #[test]
    fn flush_and_load_roundtrip() {
        let io = MemFileIo::new();
        let mut page = PageIo::fresh(32);
        page.set_offset(0);
        page.set_next_page(Some(32));
        page.set_payload_size(7);
        page.body_mut(true)[..3].copy_from_slice(b"abc");
        page.flush(&io).unwrap();
        assert!(!page.is_dirty());

        let loaded = PageIo::load(&io, 0, 32).unwrap();
        assert_eq!(loaded.next_page(), Some(32));
        assert_eq!(loaded.payload_size(), 7);
        assert_eq!(&loaded.body(true)[..3], b"abc");
    }
}
