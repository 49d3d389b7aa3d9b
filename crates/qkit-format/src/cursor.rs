//! Bounds-checked little-endian reader shared by the message parsers.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// All-ones address marking "not allocated".
pub const UNDEF_ADDR: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos.checked_add(n).ok_or(FormatError::UnexpectedEof {
            expected: usize::MAX,
            available: self.data.len(),
        })?;
        if end > self.data.len() {
            return Err(FormatError::UnexpectedEof {
                expected: end,
                available: self.data.len(),
            });
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        self.bytes(n).map(|_| ())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, FormatError> {
        Ok(LittleEndian::read_u16(self.bytes(2)?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, FormatError> {
        Ok(LittleEndian::read_u32(self.bytes(4)?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, FormatError> {
        Ok(LittleEndian::read_u64(self.bytes(8)?))
    }

    /// Read an unsigned value of 1, 2, 4 or 8 bytes.
    pub(crate) fn uint(&mut self, size: u8) -> Result<u64, FormatError> {
        match size {
            1 => self.u8().map(u64::from),
            2 => self.u16().map(u64::from),
            4 => self.u32().map(u64::from),
            8 => self.u64(),
            other => Err(FormatError::InvalidOffsetSize(other)),
        }
    }

    /// Read a file address, mapping the all-ones pattern to `None`.
    pub(crate) fn address(&mut self, size: u8) -> Result<Option<u64>, FormatError> {
        let raw = self.bytes(size as usize)?;
        if raw.iter().all(|&b| b == 0xFF) {
            return Ok(None);
        }
        let mut inner = Cursor::new(raw);
        inner.uint(size).map(Some)
    }
}

/// Append `value` as a `size`-byte little-endian integer.
pub(crate) fn put_uint(buf: &mut Vec<u8>, value: u64, size: u8) {
    let bytes = value.to_le_bytes();
    buf.extend_from_slice(&bytes[..size as usize]);
}
