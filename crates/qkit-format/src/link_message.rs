//! Link (0x0006), Link Info (0x0002) and Group Info (0x000A) messages.
//!
//! Groups are always written with compact link storage: one Link message per
//! child in the group's own object header.

use crate::cursor::{put_uint, Cursor, UNDEF_ADDR};
use crate::error::FormatError;

const FLAG_CREATION_ORDER: u8 = 0x04;
const FLAG_LINK_TYPE: u8 = 0x08;
const FLAG_CHARSET: u8 = 0x10;

/// What a link points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Object header address.
    Hard(u64),
    /// Path inside the same file.
    Soft(String),
    /// Any other link class (external or user-defined), not followed.
    Other(u8),
}

/// A named link inside a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    pub name: String,
    pub target: LinkTarget,
}

impl LinkMessage {
    pub fn hard(name: &str, address: u64) -> Self {
        Self {
            name: name.to_string(),
            target: LinkTarget::Hard(address),
        }
    }

    pub fn parse(data: &[u8], offset_size: u8) -> Result<LinkMessage, FormatError> {
        let mut c = Cursor::new(data);
        let version = c.u8()?;
        if version != 1 {
            return Err(FormatError::InvalidLinkVersion(version));
        }
        let flags = c.u8()?;
        let link_type = if flags & FLAG_LINK_TYPE != 0 { c.u8()? } else { 0 };
        if flags & FLAG_CREATION_ORDER != 0 {
            c.skip(8)?;
        }
        if flags & FLAG_CHARSET != 0 {
            c.skip(1)?;
        }
        let name_len = c.uint(1 << (flags & 0x03))? as usize;
        let name = String::from_utf8_lossy(c.bytes(name_len)?).into_owned();

        let target = match link_type {
            0 => LinkTarget::Hard(c.uint(offset_size)?),
            1 => {
                let len = c.u16()? as usize;
                LinkTarget::Soft(String::from_utf8_lossy(c.bytes(len)?).into_owned())
            }
            other => LinkTarget::Other(other),
        };
        Ok(LinkMessage { name, target })
    }

    /// Serialize a hard link. Soft and other links are never written.
    pub fn serialize(&self, offset_size: u8) -> Vec<u8> {
        let name = self.name.as_bytes();
        let (width_bits, width) = if name.len() <= 0xFF { (0u8, 1u8) } else { (1, 2) };
        let mut flags = width_bits;
        if !self.name.is_ascii() {
            flags |= FLAG_CHARSET;
        }
        let mut buf = vec![1, flags];
        if flags & FLAG_CHARSET != 0 {
            buf.push(1); // UTF-8
        }
        put_uint(&mut buf, name.len() as u64, width);
        buf.extend_from_slice(name);
        let address = match self.target {
            LinkTarget::Hard(addr) => addr,
            _ => UNDEF_ADDR,
        };
        put_uint(&mut buf, address, offset_size);
        buf
    }
}

/// Link Info for a compact group: no creation order, no fractal heap.
pub fn serialize_link_info(offset_size: u8) -> Vec<u8> {
    let mut buf = vec![0, 0];
    put_uint(&mut buf, UNDEF_ADDR, offset_size);
    put_uint(&mut buf, UNDEF_ADDR, offset_size);
    buf
}

/// Check a Link Info message; dense storage (a fractal heap) is refused.
pub fn check_link_info(data: &[u8], offset_size: u8) -> Result<(), FormatError> {
    let mut c = Cursor::new(data);
    c.skip(1)?;
    let flags = c.u8()?;
    if flags & 0x01 != 0 {
        c.skip(8)?;
    }
    match c.address(offset_size)? {
        Some(_) => Err(FormatError::DenseLinkStorage),
        None => Ok(()),
    }
}

/// Group Info with default phase-change and size estimates.
pub fn serialize_group_info() -> Vec<u8> {
    vec![0, 0]
}
