//! HDF5 superblock, versions 2 and 3.
//!
//! Version 3 is what the store writes: it is the smallest superblock that
//! carries the SWMR consistency flag.

use crate::checksum::jenkins_lookup3;
use crate::cursor::{put_uint, Cursor, UNDEF_ADDR};
use crate::error::FormatError;
use crate::signature::HDF5_SIGNATURE;

/// Size in bytes of a v2/v3 superblock with 8-byte offsets.
pub const SUPERBLOCK_SIZE: usize = 48;

/// Consistency flag: the file is open by a writer.
pub const FLAG_WRITE_ACCESS: u8 = 0x01;
/// Consistency flag: the writer allows single-writer/multiple-reader access.
pub const FLAG_SWMR_WRITE: u8 = 0x04;

/// Parsed v2/v3 superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Superblock version (2 or 3).
    pub version: u8,
    /// Size of file addresses in bytes.
    pub offset_size: u8,
    /// Size of lengths in bytes.
    pub length_size: u8,
    /// File consistency flags.
    pub consistency_flags: u8,
    /// Base address, normally 0.
    pub base_address: u64,
    /// Superblock extension object header, if any.
    pub extension_address: Option<u64>,
    /// End-of-file address.
    pub eof_address: u64,
    /// Root group object header address.
    pub root_group_address: u64,
}

impl Superblock {
    /// A version 3 superblock for a freshly serialized file.
    pub fn new_v3(eof_address: u64, root_group_address: u64, consistency_flags: u8) -> Self {
        Self {
            version: 3,
            offset_size: 8,
            length_size: 8,
            consistency_flags,
            base_address: 0,
            extension_address: None,
            eof_address,
            root_group_address,
        }
    }

    /// True when the flags advertise an open writer.
    pub fn writer_active(&self) -> bool {
        self.consistency_flags & FLAG_WRITE_ACCESS != 0
    }

    /// Parse a superblock whose signature starts at `signature_offset`.
    pub fn parse(data: &[u8], signature_offset: usize) -> Result<Superblock, FormatError> {
        let mut c = Cursor::at(data, signature_offset);
        if c.bytes(8)? != HDF5_SIGNATURE {
            return Err(FormatError::SignatureNotFound);
        }
        let version = c.u8()?;
        if !matches!(version, 2 | 3) {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let offset_size = c.u8()?;
        let length_size = c.u8()?;
        if !matches!(offset_size, 2 | 4 | 8) {
            return Err(FormatError::InvalidOffsetSize(offset_size));
        }
        if !matches!(length_size, 2 | 4 | 8) {
            return Err(FormatError::InvalidLengthSize(length_size));
        }
        let consistency_flags = c.u8()?;
        let base_address = c.uint(offset_size)?;
        let extension_address = c.address(offset_size)?;
        let eof_address = c.uint(offset_size)?;
        let root_group_address = c.uint(offset_size)?;

        let covered = &data[signature_offset..c.position()];
        let stored = c.u32()?;
        let computed = jenkins_lookup3(covered);
        if stored != computed {
            return Err(FormatError::ChecksumMismatch {
                expected: stored,
                computed,
            });
        }

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            consistency_flags,
            base_address,
            extension_address,
            eof_address,
            root_group_address,
        })
    }

    /// Serialize as a v2/v3 superblock including the trailing checksum.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SUPERBLOCK_SIZE);
        buf.extend_from_slice(&HDF5_SIGNATURE);
        buf.push(self.version);
        buf.push(self.offset_size);
        buf.push(self.length_size);
        buf.push(self.consistency_flags);
        put_uint(&mut buf, self.base_address, self.offset_size);
        put_uint(
            &mut buf,
            self.extension_address.unwrap_or(UNDEF_ADDR),
            self.offset_size,
        );
        put_uint(&mut buf, self.eof_address, self.offset_size);
        put_uint(&mut buf, self.root_group_address, self.offset_size);
        let checksum = jenkins_lookup3(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }
}
