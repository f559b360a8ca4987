//! Data section encoding and decoding
//!
//! Values use the MaxMind DB data encoding: a control byte whose top three
//! bits carry the type and whose low five bits carry the payload size,
//! followed by optional size extension bytes and the payload. Types above 7
//! are "extended": the control byte type bits are zero and the next byte
//! holds `type - 7`.
//!
//! The same codec is used for the data section (leaf values) and for the
//! metadata map at the end of the file.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::error::{GeoIpError, Result};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Maximum nesting of maps/arrays accepted by the decoder
const MAX_DECODE_DEPTH: usize = 64;

/// Decoder failures carry a static reason
type DecodeResult<T> = std::result::Result<T, &'static str>;

/// Largest size a control byte can carry (three extension bytes past 65_821)
pub const MAX_FIELD_SIZE: usize = 65_821 + 0xFF_FFFF;

/// Type identifiers from the MMDB data format
mod kind {
    pub const EXTENDED: u8 = 0;
    pub const POINTER: u8 = 1;
    pub const STRING: u8 = 2;
    pub const DOUBLE: u8 = 3;
    pub const BYTES: u8 = 4;
    pub const UINT16: u8 = 5;
    pub const UINT32: u8 = 6;
    pub const MAP: u8 = 7;
    pub const INT32: u8 = 8;
    pub const UINT64: u8 = 9;
    pub const UINT128: u8 = 10;
    pub const ARRAY: u8 = 11;
    pub const BOOL: u8 = 14;
    pub const FLOAT: u8 = 15;
}

/// Decoded value from a data or metadata section
///
/// Maps use `BTreeMap` so that encoding is byte-for-byte reproducible.
/// Pointers are resolved during decoding and never surface as values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only)
    Map(BTreeMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// String payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any unsigned integer widened to u64
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(n) => Some(*n as u64),
            DataValue::Uint32(n) => Some(*n as u64),
            DataValue::Uint64(n) => Some(*n),
            DataValue::Uint128(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Canonical encoded bytes of this value
    ///
    /// Fails with [`GeoIpError::EncodingOverflow`] when a string, byte
    /// array, map or array is larger than [`MAX_FIELD_SIZE`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_value(self, &mut out)?;
        Ok(out)
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::String(s.to_string())
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        DataValue::String(s)
    }
}

/// Deduplication table: canonical encoding -> offset in the data section
#[derive(Debug, Default)]
pub struct ValueTable {
    offsets: FxHashMap<Vec<u8>, u32>,
}

impl ValueTable {
    /// Offset of a previously emitted encoding
    pub fn get(&self, encoded: &[u8]) -> Option<u32> {
        self.offsets.get(encoded).copied()
    }

    /// Number of distinct values emitted
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// True if nothing has been emitted yet
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn insert(&mut self, encoded: Vec<u8>, offset: u32) {
        self.offsets.insert(encoded, offset);
    }
}

/// Data section encoder
///
/// Appends values to a growing buffer and returns their offsets. Identical
/// values are written once; later requests get the first offset back.
#[derive(Debug, Default)]
pub struct DataEncoder {
    buffer: Vec<u8>,
    table: ValueTable,
}

impl DataEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a value and return its offset
    pub fn encode(&mut self, value: &DataValue) -> Result<u32> {
        let encoded = value.to_bytes()?;
        if let Some(offset) = self.table.get(&encoded) {
            return Ok(offset);
        }

        let offset = u32::try_from(self.buffer.len()).map_err(|_| {
            GeoIpError::EncodingOverflow {
                required: self.buffer.len() as u64,
                limit: u32::MAX as u64,
            }
        })?;
        self.buffer.extend_from_slice(&encoded);
        self.table.insert(encoded, offset);
        Ok(offset)
    }

    /// Deduplication table built so far
    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    /// Current buffer size
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Get the final encoded data section
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

fn write_value(value: &DataValue, out: &mut Vec<u8>) -> Result<()> {
    match value {
        DataValue::String(s) => {
            write_control(kind::STRING, s.len(), out)?;
            out.extend_from_slice(s.as_bytes());
        }
        DataValue::Double(d) => {
            write_control(kind::DOUBLE, 8, out)?;
            out.extend_from_slice(&d.to_be_bytes());
        }
        DataValue::Bytes(b) => {
            write_control(kind::BYTES, b.len(), out)?;
            out.extend_from_slice(b);
        }
        DataValue::Uint16(n) => write_uint(kind::UINT16, &n.to_be_bytes(), out)?,
        DataValue::Uint32(n) => write_uint(kind::UINT32, &n.to_be_bytes(), out)?,
        DataValue::Uint64(n) => write_uint(kind::UINT64, &n.to_be_bytes(), out)?,
        DataValue::Uint128(n) => write_uint(kind::UINT128, &n.to_be_bytes(), out)?,
        DataValue::Int32(n) => {
            // Signed values keep all four bytes so the sign survives
            write_control(kind::INT32, 4, out)?;
            out.extend_from_slice(&n.to_be_bytes());
        }
        DataValue::Map(map) => {
            write_control(kind::MAP, map.len(), out)?;
            for (key, value) in map {
                write_control(kind::STRING, key.len(), out)?;
                out.extend_from_slice(key.as_bytes());
                write_value(value, out)?;
            }
        }
        DataValue::Array(items) => {
            write_control(kind::ARRAY, items.len(), out)?;
            for item in items {
                write_value(item, out)?;
            }
        }
        DataValue::Bool(b) => write_control(kind::BOOL, *b as usize, out)?,
        DataValue::Float(f) => {
            write_control(kind::FLOAT, 4, out)?;
            out.extend_from_slice(&f.to_be_bytes());
        }
    }
    Ok(())
}

/// Unsigned integers are stored without leading zero bytes
fn write_uint(type_id: u8, be_bytes: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let skip = be_bytes.iter().take_while(|&&b| b == 0).count();
    let payload = &be_bytes[skip..];
    write_control(type_id, payload.len(), out)?;
    out.extend_from_slice(payload);
    Ok(())
}

/// Write the control byte, extended type byte and size extension bytes
fn write_control(type_id: u8, size: usize, out: &mut Vec<u8>) -> Result<()> {
    if size > MAX_FIELD_SIZE {
        return Err(GeoIpError::EncodingOverflow {
            required: size as u64,
            limit: MAX_FIELD_SIZE as u64,
        });
    }

    let extended = type_id > kind::MAP;
    let type_bits = if extended { 0 } else { type_id << 5 };
    let size_bits = match size {
        0..=28 => size as u8,
        29..=284 => 29,
        285..=65_820 => 30,
        _ => 31,
    };

    out.push(type_bits | size_bits);
    if extended {
        out.push(type_id - 7);
    }
    match size_bits {
        29 => out.push((size - 29) as u8),
        30 => out.extend_from_slice(&((size - 285) as u16).to_be_bytes()),
        31 => out.extend_from_slice(&((size - 65_821) as u32).to_be_bytes()[1..]),
        _ => {}
    }
    Ok(())
}

/// Data section decoder
///
/// Pointers inside the buffer are resolved relative to its start, so the
/// decoder must be created over exactly one section (data or metadata).
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder for a section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Decode the value at `offset`
    pub fn decode(&self, offset: u32) -> DecodeResult<DataValue> {
        let mut cursor = offset as usize;
        self.decode_at(&mut cursor, 0)
    }

    fn decode_at(&self, cursor: &mut usize, depth: usize) -> DecodeResult<DataValue> {
        if depth > MAX_DECODE_DEPTH {
            return Err("Data nested too deeply");
        }

        let ctrl = self.read_byte(cursor)?;
        let mut type_id = ctrl >> 5;

        if type_id == kind::POINTER {
            let target = self.read_pointer(cursor, ctrl)?;
            let mut target_cursor = target as usize;
            // A pointer may not point at another pointer
            if let Some(&next) = self.buffer.get(target_cursor) {
                if next >> 5 == kind::POINTER {
                    return Err("Pointer to pointer");
                }
            }
            return self.decode_at(&mut target_cursor, depth + 1);
        }

        if type_id == kind::EXTENDED {
            type_id = self
                .read_byte(cursor)?
                .checked_add(7)
                .ok_or("Invalid extended type")?;
            if type_id <= kind::MAP {
                return Err("Invalid extended type");
            }
        }

        let size = self.read_size(cursor, ctrl & 0x1F)?;

        match type_id {
            kind::STRING => {
                let bytes = self.take(cursor, size)?;
                let s = std::str::from_utf8(bytes).map_err(|_| "Invalid UTF-8")?;
                Ok(DataValue::String(s.to_string()))
            }
            kind::DOUBLE => {
                if size != 8 {
                    return Err("Double must be 8 bytes");
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(self.take(cursor, 8)?);
                Ok(DataValue::Double(f64::from_be_bytes(bytes)))
            }
            kind::BYTES => Ok(DataValue::Bytes(self.take(cursor, size)?.to_vec())),
            kind::UINT16 => Ok(DataValue::Uint16(self.read_uint(cursor, size, 2)? as u16)),
            kind::UINT32 => Ok(DataValue::Uint32(self.read_uint(cursor, size, 4)? as u32)),
            kind::UINT64 => Ok(DataValue::Uint64(self.read_uint(cursor, size, 8)? as u64)),
            kind::UINT128 => Ok(DataValue::Uint128(self.read_uint(cursor, size, 16)?)),
            kind::INT32 => {
                let raw = self.read_uint(cursor, size, 4)? as u32;
                Ok(DataValue::Int32(raw as i32))
            }
            kind::MAP => {
                let mut map = BTreeMap::new();
                for _ in 0..size {
                    let key = match self.decode_at(cursor, depth + 1)? {
                        DataValue::String(s) => s,
                        _ => return Err("Map key must be string"),
                    };
                    let value = self.decode_at(cursor, depth + 1)?;
                    map.insert(key, value);
                }
                Ok(DataValue::Map(map))
            }
            kind::ARRAY => {
                // Cap the preallocation; a corrupt size must not reserve gigabytes
                let mut items = Vec::with_capacity(size.min(1024));
                for _ in 0..size {
                    items.push(self.decode_at(cursor, depth + 1)?);
                }
                Ok(DataValue::Array(items))
            }
            kind::BOOL => match size {
                0 => Ok(DataValue::Bool(false)),
                1 => Ok(DataValue::Bool(true)),
                _ => Err("Invalid bool size"),
            },
            kind::FLOAT => {
                if size != 4 {
                    return Err("Float must be 4 bytes");
                }
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(self.take(cursor, 4)?);
                Ok(DataValue::Float(f32::from_be_bytes(bytes)))
            }
            _ => Err("Unsupported data type"),
        }
    }

    fn read_byte(&self, cursor: &mut usize) -> DecodeResult<u8> {
        let b = *self.buffer.get(*cursor).ok_or("Cursor out of bounds")?;
        *cursor += 1;
        Ok(b)
    }

    fn take(&self, cursor: &mut usize, len: usize) -> DecodeResult<&'a [u8]> {
        let end = cursor.checked_add(len).ok_or("Length overflow")?;
        let bytes = self.buffer.get(*cursor..end).ok_or("Data out of bounds")?;
        *cursor = end;
        Ok(bytes)
    }

    fn read_uint(&self, cursor: &mut usize, size: usize, max: usize) -> DecodeResult<u128> {
        if size > max {
            return Err("Integer too wide");
        }
        Ok(self
            .take(cursor, size)?
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    fn read_size(&self, cursor: &mut usize, size_bits: u8) -> DecodeResult<usize> {
        match size_bits {
            0..=28 => Ok(size_bits as usize),
            29 => Ok(29 + self.read_byte(cursor)? as usize),
            30 => Ok(285 + self.read_uint(cursor, 2, 2)? as usize),
            _ => Ok(65_821 + self.read_uint(cursor, 3, 3)? as usize),
        }
    }

    fn read_pointer(&self, cursor: &mut usize, ctrl: u8) -> DecodeResult<u32> {
        let size = (ctrl >> 3) & 0x3;
        let high = (ctrl & 0x7) as u32;
        let offset = match size {
            0 => (high << 8) | self.read_uint(cursor, 1, 1)? as u32,
            1 => 2048 + ((high << 16) | self.read_uint(cursor, 2, 2)? as u32),
            2 => 526_336 + ((high << 24) | self.read_uint(cursor, 3, 3)? as u32),
            _ => self.read_uint(cursor, 4, 4)? as u32,
        };
        Ok(offset)
    }
}
