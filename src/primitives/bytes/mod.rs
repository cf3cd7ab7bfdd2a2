#![forbid(unsafe_code)]
//! Encoding and buffer utilities shared by the built-in key/value codecs.

pub mod ord {
    //! Order-preserving big-endian encoders for numeric and string keys.

    use core::convert::TryInto;

    const U64_LEN: usize = core::mem::size_of::<u64>();
    const SIGN_BIT: u64 = 1 << 63;

    /// Big-endian encoding for lexicographic order preservation.
    pub fn put_u64_be(dst: &mut [u8], v: u64) {
        assert!(dst.len() >= U64_LEN, "destination too small");
        dst[..U64_LEN].copy_from_slice(&v.to_be_bytes());
    }

    /// Decodes a u64 from big-endian byte order.
    pub fn get_u64_be(src: &[u8]) -> u64 {
        let head = src
            .get(..U64_LEN)
            .unwrap_or_else(|| panic!("u64 source shorter than 8 bytes (have {})", src.len()));
        let bytes: [u8; U64_LEN] = head.try_into().unwrap();
        u64::from_be_bytes(bytes)
    }

    /// Encodes a signed i64 with order preservation (flip the sign bit).
    pub fn put_i64_be(dst: &mut [u8], v: i64) {
        let flipped = (v as u64) ^ SIGN_BIT;
        put_u64_be(dst, flipped);
    }

    /// Decodes a signed i64 with order preservation.
    pub fn get_i64_be(src: &[u8]) -> i64 {
        let flipped = get_u64_be(src);
        let raw = flipped ^ SIGN_BIT;
        raw as i64
    }

    /// Appends a 4-byte length-prefixed byte string, using `u32::MAX` as the
    /// null sentinel and `0` as the empty-string marker (spec §4.2/§6).
    pub fn put_len_prefixed(dst: &mut Vec<u8>, bytes: Option<&[u8]>) {
        match bytes {
            None => dst.extend_from_slice(&u32::MAX.to_be_bytes()),
            Some(b) => {
                assert!(b.len() < u32::MAX as usize, "payload too long");
                dst.extend_from_slice(&(b.len() as u32).to_be_bytes());
                dst.extend_from_slice(b);
            }
        }
    }

    /// Splits a 4-byte length-prefixed byte string off the front of `src`,
    /// returning the (possibly absent) payload and the number of bytes
    /// consumed including the prefix.
    pub fn split_len_prefixed(src: &[u8]) -> (Option<&[u8]>, usize) {
        const LEN_LEN: usize = core::mem::size_of::<u32>();
        assert!(src.len() >= LEN_LEN, "length prefix truncated");
        let len = u32::from_be_bytes(src[..LEN_LEN].try_into().unwrap());
        if len == u32::MAX {
            return (None, LEN_LEN);
        }
        let len = len as usize;
        let end = LEN_LEN + len;
        assert!(src.len() >= end, "payload truncated (need {len} bytes)");
        (Some(&src[LEN_LEN..end]), end)
    }
}

pub mod buf {
    //! A simple slice-backed cursor for ergonomic parsing.

    use core::fmt;

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        /// The underlying byte slice.
        pub buf: &'a [u8],
        /// Current read offset.
        pub off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes from the cursor, advancing the offset.
        pub fn take(&mut self, n: usize) -> &'a [u8] {
            let end = self
                .off
                .checked_add(n)
                .expect("cursor offset overflow during take");
            assert!(
                end <= self.buf.len(),
                "cursor take beyond buffer: need {}, remaining {}",
                n,
                self.remaining()
            );
            let slice = &self.buf[self.off..end];
            self.off = end;
            slice
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{buf::Cursor, ord};
    use proptest::prelude::*;

    #[test]
    fn u64_roundtrip() {
        let mut dst = [0u8; 8];
        ord::put_u64_be(&mut dst, 123456789);
        assert_eq!(ord::get_u64_be(&dst), 123456789);
    }

    #[test]
    fn i64_roundtrip() {
        let mut dst = [0u8; 8];
        for &v in &[i64::MIN, -1, 0, 1, i64::MAX] {
            ord::put_i64_be(&mut dst, v);
            assert_eq!(ord::get_i64_be(&dst), v);
        }
    }

    #[test]
    fn i64_order_matches_be_bytes() {
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        ord::put_i64_be(&mut lo, -5);
        ord::put_i64_be(&mut hi, 5);
        assert!(lo < hi);
    }

    #[test]
    fn len_prefixed_roundtrip_including_null_and_empty() {
        let mut buf = Vec::new();
        ord::put_len_prefixed(&mut buf, Some(b"hello"));
        ord::put_len_prefixed(&mut buf, Some(b""));
        ord::put_len_prefixed(&mut buf, None);

        let mut cursor = buf.as_slice();
        let (a, n) = ord::split_len_prefixed(cursor);
        assert_eq!(a, Some(&b"hello"[..]));
        cursor = &cursor[n..];
        let (b, n) = ord::split_len_prefixed(cursor);
        assert_eq!(b, Some(&b""[..]));
        cursor = &cursor[n..];
        let (c, n) = ord::split_len_prefixed(cursor);
        assert_eq!(c, None);
        cursor = &cursor[n..];
        assert!(cursor.is_empty());
    }

    #[test]
    #[should_panic(expected = "cursor take beyond buffer")]
    fn cursor_take_panics_on_overread() {
        let mut cur = Cursor::new(&[1, 2, 3]);
        let _ = cur.take(4);
    }

    proptest! {
        #[test]
        fn order_preserving_u64_prop(xs in proptest::collection::vec(any::<u64>(), 1..64)) {
            let mut encoded: Vec<([u8; 8], u64)> = xs
                .iter()
                .map(|&v| {
                    let mut buf = [0u8; 8];
                    ord::put_u64_be(&mut buf, v);
                    (buf, v)
                })
                .collect();
            encoded.sort_by(|a, b| a.0.cmp(&b.0));
            let decoded: Vec<u64> = encoded.iter().map(|(buf, _)| ord::get_u64_be(buf)).collect();
            let mut expected = xs.clone();
            expected.sort();
            prop_assert_eq!(decoded, expected);
        }

        #[test]
        fn order_preserving_i64_prop(xs in proptest::collection::vec(any::<i64>(), 1..64)) {
            let mut encoded: Vec<([u8; 8], i64)> = xs
                .iter()
                .map(|&v| {
                    let mut buf = [0u8; 8];
                    ord::put_i64_be(&mut buf, v);
                    (buf, v)
                })
                .collect();
            encoded.sort_by(|a, b| a.0.cmp(&b.0));
            let decoded: Vec<i64> = encoded.iter().map(|(buf, _)| ord::get_i64_be(buf)).collect();
            let mut expected = xs.clone();
            expected.sort();
            prop_assert_eq!(decoded, expected);
        }

        #[test]
        fn len_prefixed_roundtrip_prop(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut buf = Vec::new();
            ord::put_len_prefixed(&mut buf, Some(&bytes));
            let (decoded, consumed) = ord::split_len_prefixed(&buf);
            prop_assert_eq!(decoded, Some(bytes.as_slice()));
            prop_assert_eq!(consumed, buf.len());
        }
    }
}
