//! Key/value codec contract (spec §6) and the built-in codec set.
//!
//! The core consumes a byte-exact contract; arbitrary serializer plug-ins
//! are out of scope (spec §1). These built-ins are the "recognized set"
//! spec §6 enumerates.

use crate::error::{Result, StrataError};
use crate::primitives::bytes::ord;

/// Encodes and decodes a key type to/from its on-disk byte representation.
pub trait KeyCodec<K>: Send + Sync + 'static {
    fn encode_key(&self, key: &K) -> Vec<u8>;
    fn decode_key(&self, bytes: &[u8]) -> Result<K>;
    /// Stable, short codec name persisted in the tree header record's
    /// `keySerializerFQCN` field (spec §4.2, §9: "stringly-typed name for
    /// backward compatibility").
    fn name(&self) -> &'static str;
}

/// Encodes and decodes a value type to/from its on-disk byte representation.
pub trait ValCodec<V>: Send + Sync + 'static {
    fn encode_value(&self, value: &V) -> Vec<u8>;
    fn decode_value(&self, bytes: &[u8]) -> Result<V>;
    fn name(&self) -> &'static str;
}

fn corrupt(what: &str) -> StrataError {
    StrataError::CorruptPage(format!("{what}: truncated payload"))
}

/// Single-byte boolean codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoolCodec;

impl KeyCodec<bool> for BoolCodec {
    fn encode_key(&self, key: &bool) -> Vec<u8> {
        vec![*key as u8]
    }
    fn decode_key(&self, bytes: &[u8]) -> Result<bool> {
        Ok(*bytes.first().ok_or_else(|| corrupt("bool"))? != 0)
    }
    fn name(&self) -> &'static str {
        "boolean"
    }
}
impl ValCodec<bool> for BoolCodec {
    fn encode_value(&self, value: &bool) -> Vec<u8> {
        self.encode_key(value)
    }
    fn decode_value(&self, bytes: &[u8]) -> Result<bool> {
        self.decode_key(bytes)
    }
    fn name(&self) -> &'static str {
        "boolean"
    }
}

/// Single-byte codec for a signed byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteCodec;

impl KeyCodec<i8> for ByteCodec {
    fn encode_key(&self, key: &i8) -> Vec<u8> {
        vec![*key as u8]
    }
    fn decode_key(&self, bytes: &[u8]) -> Result<i8> {
        Ok(*bytes.first().ok_or_else(|| corrupt("byte"))? as i8)
    }
    fn name(&self) -> &'static str {
        "byte"
    }
}
impl ValCodec<i8> for ByteCodec {
    fn encode_value(&self, value: &i8) -> Vec<u8> {
        self.encode_key(value)
    }
    fn decode_value(&self, bytes: &[u8]) -> Result<i8> {
        self.decode_key(bytes)
    }
    fn name(&self) -> &'static str {
        "byte"
    }
}

/// Two-byte big-endian codec for a 16-bit character code unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharCodec;

impl KeyCodec<u16> for CharCodec {
    fn encode_key(&self, key: &u16) -> Vec<u8> {
        key.to_be_bytes().to_vec()
    }
    fn decode_key(&self, bytes: &[u8]) -> Result<u16> {
        let arr: [u8; 2] = bytes.get(..2).ok_or_else(|| corrupt("char"))?.try_into().unwrap();
        Ok(u16::from_be_bytes(arr))
    }
    fn name(&self) -> &'static str {
        "char"
    }
}
impl ValCodec<u16> for CharCodec {
    fn encode_value(&self, value: &u16) -> Vec<u8> {
        self.encode_key(value)
    }
    fn decode_value(&self, bytes: &[u8]) -> Result<u16> {
        self.decode_key(bytes)
    }
    fn name(&self) -> &'static str {
        "char"
    }
}

/// Two-byte big-endian codec for a signed short.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShortCodec;

impl KeyCodec<i16> for ShortCodec {
    fn encode_key(&self, key: &i16) -> Vec<u8> {
        key.to_be_bytes().to_vec()
    }
    fn decode_key(&self, bytes: &[u8]) -> Result<i16> {
        let arr: [u8; 2] = bytes.get(..2).ok_or_else(|| corrupt("short"))?.try_into().unwrap();
        Ok(i16::from_be_bytes(arr))
    }
    fn name(&self) -> &'static str {
        "short"
    }
}
impl ValCodec<i16> for ShortCodec {
    fn encode_value(&self, value: &i16) -> Vec<u8> {
        self.encode_key(value)
    }
    fn decode_value(&self, bytes: &[u8]) -> Result<i16> {
        self.decode_key(bytes)
    }
    fn name(&self) -> &'static str {
        "short"
    }
}

/// Order-preserving 4-byte codec for a signed int.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntCodec;

impl KeyCodec<i32> for IntCodec {
    fn encode_key(&self, key: &i32) -> Vec<u8> {
        ((*key as u32) ^ (1 << 31)).to_be_bytes().to_vec()
    }
    fn decode_key(&self, bytes: &[u8]) -> Result<i32> {
        let arr: [u8; 4] = bytes.get(..4).ok_or_else(|| corrupt("int"))?.try_into().unwrap();
        Ok((u32::from_be_bytes(arr) ^ (1 << 31)) as i32)
    }
    fn name(&self) -> &'static str {
        "int"
    }
}
impl ValCodec<i32> for IntCodec {
    fn encode_value(&self, value: &i32) -> Vec<u8> {
        self.encode_key(value)
    }
    fn decode_value(&self, bytes: &[u8]) -> Result<i32> {
        self.decode_key(bytes)
    }
    fn name(&self) -> &'static str {
        "int"
    }
}

/// Order-preserving 8-byte codec for a signed long.
#[derive(Debug, Default, Clone, Copy)]
pub struct LongCodec;

impl KeyCodec<i64> for LongCodec {
    fn encode_key(&self, key: &i64) -> Vec<u8> {
        let mut buf = [0u8; 8];
        ord::put_i64_be(&mut buf, *key);
        buf.to_vec()
    }
    fn decode_key(&self, bytes: &[u8]) -> Result<i64> {
        if bytes.len() < 8 {
            return Err(corrupt("long"));
        }
        Ok(ord::get_i64_be(bytes))
    }
    fn name(&self) -> &'static str {
        "long"
    }
}
impl ValCodec<i64> for LongCodec {
    fn encode_value(&self, value: &i64) -> Vec<u8> {
        self.encode_key(value)
    }
    fn decode_value(&self, bytes: &[u8]) -> Result<i64> {
        self.decode_key(bytes)
    }
    fn name(&self) -> &'static str {
        "long"
    }
}

/// Length-prefixed byte-string codec (`-1` null, `0` empty, spec §6).
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteArrayCodec;

impl KeyCodec<Vec<u8>> for ByteArrayCodec {
    fn encode_key(&self, key: &Vec<u8>) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + key.len());
        ord::put_len_prefixed(&mut buf, Some(key));
        buf
    }
    fn decode_key(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let (b, _) = ord::split_len_prefixed(bytes);
        Ok(b.ok_or_else(|| corrupt("byte[]"))?.to_vec())
    }
    fn name(&self) -> &'static str {
        "byte[]"
    }
}
impl ValCodec<Vec<u8>> for ByteArrayCodec {
    fn encode_value(&self, value: &Vec<u8>) -> Vec<u8> {
        self.encode_key(value)
    }
    fn decode_value(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.decode_key(bytes)
    }
    fn name(&self) -> &'static str {
        "byte[]"
    }
}

/// UTF-8 string codec using the same length-prefix convention as `byte[]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringCodec;

impl KeyCodec<String> for StringCodec {
    fn encode_key(&self, key: &String) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + key.len());
        ord::put_len_prefixed(&mut buf, Some(key.as_bytes()));
        buf
    }
    fn decode_key(&self, bytes: &[u8]) -> Result<String> {
        let (b, _) = ord::split_len_prefixed(bytes);
        let b = b.ok_or_else(|| corrupt("string"))?;
        String::from_utf8(b.to_vec())
            .map_err(|_| StrataError::CorruptPage("string codec: invalid UTF-8".into()))
    }
    fn name(&self) -> &'static str {
        "string"
    }
}
impl ValCodec<String> for StringCodec {
    fn encode_value(&self, value: &String) -> Vec<u8> {
        self.encode_key(value)
    }
    fn decode_value(&self, bytes: &[u8]) -> Result<String> {
        self.decode_key(bytes)
    }
    fn name(&self) -> &'static str {
        "string"
    }
}

/// Codec for `Vec<i64>`: a 4-byte count followed by `count * 8` bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LongArrayCodec;

impl ValCodec<Vec<i64>> for LongArrayCodec {
    fn encode_value(&self, value: &Vec<i64>) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + value.len() * 8);
        buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        for v in value {
            let mut fixed = [0u8; 8];
            ord::put_i64_be(&mut fixed, *v);
            buf.extend_from_slice(&fixed);
        }
        buf
    }
    fn decode_value(&self, bytes: &[u8]) -> Result<Vec<i64>> {
        if bytes.len() < 4 {
            return Err(corrupt("long[]"));
        }
        let count = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let mut out = Vec::with_capacity(count);
        let mut pos = 4;
        for _ in 0..count {
            if bytes.len() < pos + 8 {
                return Err(corrupt("long[]"));
            }
            out.push(ord::get_i64_be(&bytes[pos..pos + 8]));
            pos += 8;
        }
        Ok(out)
    }
    fn name(&self) -> &'static str {
        "long[]"
    }
}
