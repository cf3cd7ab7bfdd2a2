//! File header, tree-header-record, and node/leaf-record wire formats
//! (spec §4.2, §6). All multi-byte fields are big-endian.

use crate::error::{Result, StrataError};
use crate::primitives::bytes::ord::{get_i64_be, get_u64_be, put_i64_be, put_u64_be};

/// Size in bytes of the file header (spec §6: "Bytes 0..4 .. 16..24").
pub const FILE_HEADER_LEN: usize = 24;

/// The 24-byte file header living at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub page_size: u32,
    pub nb_trees: u32,
    pub first_free_page: i64,
    pub last_free_page: i64,
}

impl FileHeader {
    pub fn encode(&self) -> [u8; FILE_HEADER_LEN] {
        let mut buf = [0u8; FILE_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.page_size.to_be_bytes());
        buf[4..8].copy_from_slice(&self.nb_trees.to_be_bytes());
        put_i64_be(&mut buf[8..16], self.first_free_page);
        put_i64_be(&mut buf[16..24], self.last_free_page);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FILE_HEADER_LEN {
            return Err(StrataError::CorruptPage("file header truncated".into()));
        }
        let page_size = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        if page_size < 64 || !page_size.is_power_of_two() {
            return Err(StrataError::CorruptPage(format!(
                "file header page size {page_size} is not a power of two >= 64"
            )));
        }
        let nb_trees = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        let first_free_page = get_i64_be(&buf[8..16]);
        let last_free_page = get_i64_be(&buf[16..24]);
        Ok(Self {
            page_size,
            nb_trees,
            first_free_page,
            last_free_page,
        })
    }
}

/// Appends a u32 length prefix followed by bytes; `u32::MAX` denotes a null
/// string, `0` an empty one (spec §4.2).
fn put_string(dst: &mut Vec<u8>, s: Option<&str>) {
    crate::primitives::bytes::ord::put_len_prefixed(dst, s.map(str::as_bytes));
}

fn take_string<'a>(src: &'a [u8]) -> Result<(Option<&'a str>, usize)> {
    let (bytes, consumed) = crate::primitives::bytes::ord::split_len_prefixed(src);
    let s = match bytes {
        None => None,
        Some(b) => Some(std::str::from_utf8(b).map_err(|_| {
            StrataError::CorruptPage("tree header record contains invalid UTF-8".into())
        })?),
    };
    Ok((s, consumed))
}

/// The per-tree header record chained from the file header (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeHeaderRecord {
    pub revision: u64,
    pub nb_elems: u64,
    pub root_page_offset: i64,
    pub next_btree_offset: i64,
    pub page_size: u32,
    pub name: String,
    pub key_serializer_fqcn: String,
    pub value_serializer_fqcn: String,
}

impl TreeHeaderRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.name.len());
        let mut fixed = [0u8; 8];
        put_u64_be(&mut fixed, self.revision);
        buf.extend_from_slice(&fixed);
        put_u64_be(&mut fixed, self.nb_elems);
        buf.extend_from_slice(&fixed);
        put_i64_be(&mut fixed, self.root_page_offset);
        buf.extend_from_slice(&fixed);
        put_i64_be(&mut fixed, self.next_btree_offset);
        buf.extend_from_slice(&fixed);
        buf.extend_from_slice(&self.page_size.to_be_bytes());
        put_string(&mut buf, Some(&self.name));
        put_string(&mut buf, Some(&self.key_serializer_fqcn));
        put_string(&mut buf, Some(&self.value_serializer_fqcn));
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let need = |n: usize, have: usize| -> Result<()> {
            if have < n {
                Err(StrataError::CorruptPage("tree header record truncated".into()))
            } else {
                Ok(())
            }
        };
        need(36, buf.len())?;
        let revision = get_u64_be(&buf[0..8]);
        let nb_elems = get_u64_be(&buf[8..16]);
        let root_page_offset = get_i64_be(&buf[16..24]);
        let next_btree_offset = get_i64_be(&buf[24..32]);
        let page_size = u32::from_be_bytes(buf[32..36].try_into().unwrap());
        let mut pos = 36;
        let (name, n) = take_string(&buf[pos..])?;
        pos += n;
        let (key_codec, n) = take_string(&buf[pos..])?;
        pos += n;
        let (val_codec, _n) = take_string(&buf[pos..])?;
        Ok(Self {
            revision,
            nb_elems,
            root_page_offset,
            next_btree_offset,
            page_size,
            name: name
                .ok_or_else(|| StrataError::CorruptPage("tree header record has no name".into()))?
                .to_owned(),
            key_serializer_fqcn: key_codec
                .ok_or_else(|| StrataError::CorruptPage("tree header record missing key codec".into()))?
                .to_owned(),
            value_serializer_fqcn: val_codec
                .ok_or_else(|| {
                    StrataError::CorruptPage("tree header record missing value codec".into())
                })?
                .to_owned(),
        })
    }
}

/// Decoded shape of a tree node/leaf record (spec §4.2).
pub enum NodeRecord {
    Leaf {
        revision: u64,
        /// (value bytes, key bytes) per element, in key order.
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    },
    Internal {
        revision: u64,
        keys: Vec<Vec<u8>>,
        /// `keys.len() + 1` child offsets.
        children: Vec<u64>,
    },
}

fn put_bytes(dst: &mut Vec<u8>, b: &[u8]) {
    crate::primitives::bytes::ord::put_len_prefixed(dst, Some(b));
}

fn take_bytes<'a>(src: &'a [u8]) -> Result<(&'a [u8], usize)> {
    let (b, n) = crate::primitives::bytes::ord::split_len_prefixed(src);
    Ok((
        b.ok_or_else(|| StrataError::CorruptPage("node record key/value byte string is null".into()))?,
        n,
    ))
}

impl NodeRecord {
    /// Encodes the record's fields, *not* including the leading
    /// revision/count/payload-size header written by the caller so that the
    /// payload size can be computed first.
    fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            NodeRecord::Leaf { entries, .. } => {
                for (value, key) in entries {
                    put_bytes(&mut buf, value);
                    put_bytes(&mut buf, key);
                }
            }
            NodeRecord::Internal { keys, children, .. } => {
                debug_assert_eq!(children.len(), keys.len() + 1);
                for (key, child) in keys.iter().zip(children.iter()) {
                    let mut fixed = [0u8; 8];
                    put_u64_be(&mut fixed, *child);
                    buf.extend_from_slice(&fixed);
                    put_bytes(&mut buf, key);
                }
                let mut fixed = [0u8; 8];
                put_u64_be(&mut fixed, *children.last().copied().unwrap_or(0));
                buf.extend_from_slice(&fixed);
            }
        }
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        let (revision, count) = match self {
            NodeRecord::Leaf { revision, entries } => (*revision, entries.len() as i32),
            NodeRecord::Internal { revision, keys, .. } => (*revision, -(keys.len() as i32)),
        };
        let body = self.encode_body();
        let mut out = Vec::with_capacity(16 + body.len());
        let mut fixed = [0u8; 8];
        put_u64_be(&mut fixed, revision);
        out.extend_from_slice(&fixed);
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 16 {
            return Err(StrataError::CorruptPage("node record truncated".into()));
        }
        let revision = get_u64_be(&buf[0..8]);
        let count = i32::from_be_bytes(buf[8..12].try_into().unwrap());
        let payload_size = u32::from_be_bytes(buf[12..16].try_into().unwrap()) as usize;
        let body = &buf[16..];
        if body.len() < payload_size {
            return Err(StrataError::CorruptPage(
                "node record payload shorter than declared size".into(),
            ));
        }
        let body = &body[..payload_size];

        if count >= 0 {
            let n = count as usize;
            let mut entries = Vec::with_capacity(n);
            let mut pos = 0;
            for _ in 0..n {
                let (value, used) = take_bytes(&body[pos..])?;
                pos += used;
                let (key, used) = take_bytes(&body[pos..])?;
                pos += used;
                entries.push((value.to_vec(), key.to_vec()));
            }
            Ok(NodeRecord::Leaf { revision, entries })
        } else {
            let n = (-count) as usize;
            let mut keys = Vec::with_capacity(n);
            let mut children = Vec::with_capacity(n + 1);
            let mut pos = 0;
            for _ in 0..n {
                if body.len() < pos + 8 {
                    return Err(StrataError::CorruptPage("internal record truncated".into()));
                }
                children.push(get_u64_be(&body[pos..pos + 8]));
                pos += 8;
                let (key, used) = take_bytes(&body[pos..])?;
                pos += used;
                keys.push(key.to_vec());
            }
            if body.len() < pos + 8 {
                return Err(StrataError::CorruptPage(
                    "internal record missing trailing child offset".into(),
                ));
            }
            children.push(get_u64_be(&body[pos..pos + 8]));
            Ok(NodeRecord::Internal {
                revision,
                keys,
                children,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_roundtrip() {
        let h = FileHeader {
            page_size: 4096,
            nb_trees: 2,
            first_free_page: -1,
            last_free_page: 128,
        };
        let decoded = FileHeader::decode(&h.encode()).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn file_header_rejects_bad_page_size() {
        let mut buf = [0u8; FILE_HEADER_LEN];
        buf[0..4].copy_from_slice(&100u32.to_be_bytes());
        assert!(FileHeader::decode(&buf).is_err());
    }

    #[test]
    fn tree_header_roundtrip() {
        let rec = TreeHeaderRecord {
            revision: 7,
            nb_elems: 42,
            root_page_offset: 4096,
            next_btree_offset: -1,
            page_size: 4096,
            name: "people".into(),
            key_serializer_fqcn: "long".into(),
            value_serializer_fqcn: "string".into(),
        };
        let decoded = TreeHeaderRecord::decode(&rec.encode()).unwrap();
        assert_eq!(rec, decoded);
    }

    #[test]
    fn leaf_record_roundtrip() {
        let rec = NodeRecord::Leaf {
            revision: 3,
            entries: vec![
                (b"v1".to_vec(), b"k1".to_vec()),
                (b"".to_vec(), b"k2".to_vec()),
            ],
        };
        let encoded = rec.encode();
        match NodeRecord::decode(&encoded).unwrap() {
            NodeRecord::Leaf { revision, entries } => {
                assert_eq!(revision, 3);
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0], (b"v1".to_vec(), b"k1".to_vec()));
                assert_eq!(entries[1], (b"".to_vec(), b"k2".to_vec()));
            }
            _ => panic!("expected leaf record"),
        }
    }

    #[test]
    fn internal_record_roundtrip() {
        let rec = NodeRecord::Internal {
            revision: 9,
            keys: vec![b"m".to_vec()],
            children: vec![100, 200],
        };
        let encoded = rec.encode();
        match NodeRecord::decode(&encoded).unwrap() {
            NodeRecord::Internal {
                revision,
                keys,
                children,
            } => {
                assert_eq!(revision, 9);
                assert_eq!(keys, vec![b"m".to_vec()]);
                assert_eq!(children, vec![100, 200]);
            }
            _ => panic!("expected internal record"),
        }
    }
}
