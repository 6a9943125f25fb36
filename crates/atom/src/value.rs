//! The dynamically-typed scalar carried by `Value` atoms.
//!
//! Source systems this is distilled from permit arbitrary host-language
//! values; a statically typed target exposes a closed tagged variant
//! instead (see `SPEC_FULL.md` §3 / §9).

use crate::error::{AtomError, Result};
use crate::id::AtomId;
use crate::varint::{read_varint, write_varint};
use serde::{Deserialize, Serialize};

/// A dynamically-typed scalar value stored inside a `Value` atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    I64(i64),
    /// A 64-bit float. Never compared with `==` directly by collections;
    /// equality here is bitwise (`PartialEq` on `f64`), matching Rust's
    /// default float semantics rather than a total order.
    F64(f64),
    /// A UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A reference to another atom (e.g. a nested collection or blob).
    AtomRef(AtomId),
}

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_I64: u8 = 2;
const TAG_F64: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_ATOM_REF: u8 = 6;

impl Value {
    /// Encode this value into `out` using the canonical little-endian,
    /// length-prefixed-UTF-8 layout described in spec §4.1.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(TAG_NULL),
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(*b as u8);
            }
            Value::I64(v) => {
                out.push(TAG_I64);
                out.extend_from_slice(&v.to_le_bytes());
            }
            Value::F64(v) => {
                out.push(TAG_F64);
                out.extend_from_slice(&v.to_le_bytes());
            }
            Value::Str(s) => {
                out.push(TAG_STR);
                write_varint(s.len() as u64, out);
                out.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                out.push(TAG_BYTES);
                write_varint(b.len() as u64, out);
                out.extend_from_slice(b);
            }
            Value::AtomRef(id) => {
                out.push(TAG_ATOM_REF);
                out.extend_from_slice(id.as_bytes());
            }
        }
    }

    /// Decode a value from the front of `bytes`, returning the value and
    /// the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let tag = *bytes.first().ok_or(AtomError::ShortRead { want: 1, got: 0 })?;
        match tag {
            TAG_NULL => Ok((Value::Null, 1)),
            TAG_BOOL => {
                let b = *bytes.get(1).ok_or(AtomError::ShortRead { want: 2, got: 1 })?;
                Ok((Value::Bool(b != 0), 2))
            }
            TAG_I64 => {
                let slice = bytes
                    .get(1..9)
                    .ok_or(AtomError::ShortRead { want: 9, got: bytes.len() })?;
                let v = i64::from_le_bytes(slice.try_into().unwrap());
                Ok((Value::I64(v), 9))
            }
            TAG_F64 => {
                let slice = bytes
                    .get(1..9)
                    .ok_or(AtomError::ShortRead { want: 9, got: bytes.len() })?;
                let v = f64::from_le_bytes(slice.try_into().unwrap());
                Ok((Value::F64(v), 9))
            }
            TAG_STR => {
                let (len, used) = read_varint(&bytes[1..])?;
                let start = 1 + used;
                let end = start + len as usize;
                let slice = bytes
                    .get(start..end)
                    .ok_or(AtomError::ShortRead { want: end, got: bytes.len() })?;
                let s = String::from_utf8(slice.to_vec()).map_err(|_| AtomError::InvalidUtf8)?;
                Ok((Value::Str(s), end))
            }
            TAG_BYTES => {
                let (len, used) = read_varint(&bytes[1..])?;
                let start = 1 + used;
                let end = start + len as usize;
                let slice = bytes
                    .get(start..end)
                    .ok_or(AtomError::ShortRead { want: end, got: bytes.len() })?;
                Ok((Value::Bytes(slice.to_vec()), end))
            }
            TAG_ATOM_REF => {
                let slice = bytes
                    .get(1..17)
                    .ok_or(AtomError::ShortRead { want: 17, got: bytes.len() })?;
                let mut id = [0u8; 16];
                id.copy_from_slice(slice);
                Ok((Value::AtomRef(AtomId(id)), 17))
            }
            other => Err(AtomError::CorruptAtom(format!("unknown value tag {other}"))),
        }
    }
}
