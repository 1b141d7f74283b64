//! Pluggable data item serialization.
//!
//! The storage layer never interprets item contents. Callers supply a
//! codec describing how to size, encode and decode their record type;
//! every stored item must be self-describing enough to recover its key
//! and total length from its header alone, both for random access and
//! for sequential streaming during merges.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Key and total length recovered from an item header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    /// Full encoded size of the item, header included
    pub total_size: usize,
    /// The item's key
    pub key: u64,
}

/// Serialization contract for one record type.
pub trait DataItemCodec: Send + Sync {
    /// The record type this codec handles
    type Item;

    /// Size in bytes of every item header
    fn header_size(&self) -> usize;

    /// Full encoded size of the given item, header included
    fn serialized_size(&self, item: &Self::Item) -> usize;

    /// Recover key and total size from the first [`Self::header_size`]
    /// bytes of an encoded item
    fn deserialize_header(&self, bytes: &[u8]) -> Result<ItemHeader>;

    /// Append the full encoding of `item` to `out`
    fn serialize(&self, item: &Self::Item, out: &mut Vec<u8>);

    /// Decode an item from its full encoding. `format_version` is the
    /// serialization version recorded in the file the bytes came from.
    fn deserialize(&self, bytes: &[u8], format_version: u32) -> Result<Self::Item>;

    /// Version stamped into files written with this codec
    fn current_format_version(&self) -> u32;
}

fn truncated(wanted: usize, got: usize) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("item needs {} bytes, only {} available", wanted, got),
    ))
}

/// Fixed-size codec for `[u64; 2]` items where `item[0]` is the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoLongsCodec;

impl DataItemCodec for TwoLongsCodec {
    type Item = [u64; 2];

    fn header_size(&self) -> usize {
        8
    }

    fn serialized_size(&self, _item: &Self::Item) -> usize {
        16
    }

    fn deserialize_header(&self, bytes: &[u8]) -> Result<ItemHeader> {
        if bytes.len() < 8 {
            return Err(truncated(8, bytes.len()));
        }
        Ok(ItemHeader {
            total_size: 16,
            key: BigEndian::read_u64(bytes),
        })
    }

    fn serialize(&self, item: &Self::Item, out: &mut Vec<u8>) {
        let mut buf = [0u8; 16];
        BigEndian::write_u64(&mut buf[..8], item[0]);
        BigEndian::write_u64(&mut buf[8..], item[1]);
        out.extend_from_slice(&buf);
    }

    fn deserialize(&self, bytes: &[u8], _format_version: u32) -> Result<Self::Item> {
        if bytes.len() < 16 {
            return Err(truncated(16, bytes.len()));
        }
        Ok([BigEndian::read_u64(&bytes[..8]), BigEndian::read_u64(&bytes[8..16])])
    }

    fn current_format_version(&self) -> u32 {
        1
    }
}

/// Variable-size codec for `Vec<u64>` items where `item[0]` is the key.
///
/// Encoding: `[key u64][count u32][values u64 * count]` with count not
/// including the key. Items must hold at least the key; passing an empty
/// vec is a programming error and panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct VarLongsCodec;

impl DataItemCodec for VarLongsCodec {
    type Item = Vec<u64>;

    fn header_size(&self) -> usize {
        12
    }

    fn serialized_size(&self, item: &Self::Item) -> usize {
        assert!(!item.is_empty(), "item must hold at least its key");
        12 + (item.len() - 1) * 8
    }

    fn deserialize_header(&self, bytes: &[u8]) -> Result<ItemHeader> {
        if bytes.len() < 12 {
            return Err(truncated(12, bytes.len()));
        }
        let key = BigEndian::read_u64(&bytes[..8]);
        let count = BigEndian::read_u32(&bytes[8..12]) as usize;
        Ok(ItemHeader {
            total_size: 12 + count * 8,
            key,
        })
    }

    fn serialize(&self, item: &Self::Item, out: &mut Vec<u8>) {
        assert!(!item.is_empty(), "item must hold at least its key");
        let mut buf = [0u8; 8];
        BigEndian::write_u64(&mut buf, item[0]);
        out.extend_from_slice(&buf);
        let mut count = [0u8; 4];
        BigEndian::write_u32(&mut count, (item.len() - 1) as u32);
        out.extend_from_slice(&count);
        for value in &item[1..] {
            BigEndian::write_u64(&mut buf, *value);
            out.extend_from_slice(&buf);
        }
    }

    fn deserialize(&self, bytes: &[u8], _format_version: u32) -> Result<Self::Item> {
        let header = self.deserialize_header(bytes)?;
        if bytes.len() < header.total_size {
            return Err(truncated(header.total_size, bytes.len()));
        }
        let count = (header.total_size - 12) / 8;
        let mut item = Vec::with_capacity(count + 1);
        item.push(header.key);
        for i in 0..count {
            let start = 12 + i * 8;
            item.push(BigEndian::read_u64(&bytes[start..start + 8]));
        }
        Ok(item)
    }

    fn current_format_version(&self) -> u32 {
        1
    }
}
