//! Binary codec for replicating resolved tags.
//!
//! ## Layout
//!
//! ```text
//! SerializedTagGroup := VarInt(tag count) { String(tag id) IntList(raw ids) }*
//! String             := VarInt(byte length) UTF-8 bytes
//! IntList            := VarInt(count) i32-BE*
//! ```
//!
//! VarInts are 7-bit little-endian groups with a continuation bit, at most
//! five bytes for an `i32`.

use std::collections::BTreeMap;

use zerocopy::byteorder::{BigEndian, I32};
use zerocopy::{FromBytes, IntoBytes};

use crate::group::SerializedTagGroup;
use crate::identifier::{Identifier, IdentifierError};

/// Longest string (in bytes) accepted by the codec.
pub const MAX_STRING_LEN: usize = 32767;

const MAX_VAR_INT_BYTES: usize = 5;

/// Append-only packet buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_var_int(&mut self, value: i32) {
        let mut value = value as u32;
        loop {
            if value & !0x7f == 0 {
                self.buf.push(value as u8);
                return;
            }
            self.buf.push((value & 0x7f) as u8 | 0x80);
            value >>= 7;
        }
    }

    /// Lengths are VarInts, so anything above `i32::MAX` is rejected.
    pub fn write_len(&mut self, len: usize) -> Result<(), WireError> {
        let len = i32::try_from(len).map_err(|_| WireError::LengthOverflow(len))?;
        self.write_var_int(len);
        Ok(())
    }

    /// Fails for strings the reader would reject, leaving the buffer untouched.
    pub fn write_string(&mut self, value: &str) -> Result<(), WireError> {
        if value.len() > MAX_STRING_LEN {
            return Err(WireError::StringTooLong(value.len()));
        }
        self.write_len(value.len())?;
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn write_identifier(&mut self, id: &Identifier) -> Result<(), WireError> {
        self.write_string(&id.to_string())
    }

    pub fn write_int_list(&mut self, values: &[i32]) -> Result<(), WireError> {
        self.write_len(values.len())?;
        for &value in values {
            self.buf.extend_from_slice(I32::<BigEndian>::new(value).as_bytes());
        }
        Ok(())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received packet.
#[derive(Clone, Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() < n {
            return Err(WireError::UnexpectedEof {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_var_int(&mut self) -> Result<i32, WireError> {
        let mut value: u32 = 0;
        for i in 0..MAX_VAR_INT_BYTES {
            let byte = self.take(1)?[0];
            value |= u32::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
        Err(WireError::VarIntTooLong)
    }

    pub fn read_len(&mut self) -> Result<usize, WireError> {
        let len = self.read_var_int()?;
        usize::try_from(len).map_err(|_| WireError::NegativeLength(len))
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_len()?;
        if len > MAX_STRING_LEN {
            return Err(WireError::StringTooLong(len));
        }
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| WireError::InvalidUtf8)
    }

    pub fn read_identifier(&mut self) -> Result<Identifier, WireError> {
        let raw = self.read_string()?;
        Ok(Identifier::parse(&raw)?)
    }

    pub fn read_int_list(&mut self) -> Result<Vec<i32>, WireError> {
        let count = self.read_len()?;
        let needed = count.checked_mul(4).ok_or(WireError::UnexpectedEof {
            needed: usize::MAX,
            remaining: self.buf.len(),
        })?;
        let bytes = self.take(needed)?;
        let (ints, _) = <[I32<BigEndian>]>::ref_from_prefix_with_elems(bytes, count)
            .map_err(|_| WireError::UnexpectedEof {
                needed,
                remaining: bytes.len(),
            })?;
        Ok(ints.iter().map(|v| v.get()).collect())
    }
}

/// Errors while encoding or decoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of packet: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("VarInt longer than 5 bytes")]
    VarIntTooLong,
    #[error("invalid length {0}")]
    NegativeLength(i32),
    #[error("length {0} does not fit in a VarInt")]
    LengthOverflow(usize),
    #[error("string of {0} bytes exceeds the 32767 byte limit")]
    StringTooLong(usize),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),
}

impl SerializedTagGroup {
    pub fn write(&self, buf: &mut PacketWriter) -> Result<(), WireError> {
        buf.write_len(self.contents.len())?;
        for (id, raw_ids) in &self.contents {
            buf.write_identifier(id)?;
            buf.write_int_list(raw_ids)?;
        }
        Ok(())
    }

    pub fn read(buf: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let count = buf.read_len()?;
        let mut contents = BTreeMap::new();
        for _ in 0..count {
            let id = buf.read_identifier()?;
            let raw_ids = buf.read_int_list()?;
            contents.insert(id, raw_ids);
        }
        Ok(Self { contents })
    }
}
