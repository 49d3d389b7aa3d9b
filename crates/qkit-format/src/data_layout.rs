//! Data Layout message (type 0x0008).

use crate::cursor::{put_uint, Cursor, UNDEF_ADDR};
use crate::error::FormatError;

/// Where a dataset's raw data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLayout {
    /// Raw data stored inside the message.
    Compact { data: Vec<u8> },
    /// One contiguous block; `address` is `None` while unallocated.
    Contiguous { address: Option<u64>, size: u64 },
    /// Chunks indexed by a version 1 B-tree.
    ///
    /// `chunk_dims` has rank + 1 entries, the last being the element size.
    Chunked {
        btree_address: Option<u64>,
        chunk_dims: Vec<u32>,
    },
}

impl DataLayout {
    /// Parse versions 3 and 4. Version 4 chunked layouts use index types
    /// other than the v1 B-tree and are refused.
    pub fn parse(data: &[u8], offset_size: u8, length_size: u8) -> Result<DataLayout, FormatError> {
        let mut c = Cursor::new(data);
        let version = c.u8()?;
        if version != 3 && version != 4 {
            return Err(FormatError::InvalidLayoutVersion(version));
        }
        match c.u8()? {
            0 => {
                let size = c.u16()? as usize;
                Ok(DataLayout::Compact {
                    data: c.bytes(size)?.to_vec(),
                })
            }
            1 => Ok(DataLayout::Contiguous {
                address: c.address(offset_size)?,
                size: c.uint(length_size)?,
            }),
            2 if version == 3 => {
                let dimensionality = c.u8()? as usize;
                let btree_address = c.address(offset_size)?;
                let chunk_dims = (0..dimensionality)
                    .map(|_| c.u32())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DataLayout::Chunked {
                    btree_address,
                    chunk_dims,
                })
            }
            2 => Err(FormatError::InvalidLayoutVersion(version)),
            other => Err(FormatError::InvalidLayoutClass(other)),
        }
    }

    /// Serialize as a version 3 message.
    pub fn serialize(&self, offset_size: u8, length_size: u8) -> Vec<u8> {
        let mut buf = vec![3];
        match self {
            DataLayout::Compact { data } => {
                buf.push(0);
                buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
                buf.extend_from_slice(data);
            }
            DataLayout::Contiguous { address, size } => {
                buf.push(1);
                put_uint(&mut buf, address.unwrap_or(UNDEF_ADDR), offset_size);
                put_uint(&mut buf, *size, length_size);
            }
            DataLayout::Chunked {
                btree_address,
                chunk_dims,
            } => {
                buf.push(2);
                buf.push(chunk_dims.len() as u8);
                put_uint(&mut buf, btree_address.unwrap_or(UNDEF_ADDR), offset_size);
                for d in chunk_dims {
                    buf.extend_from_slice(&d.to_le_bytes());
                }
            }
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_roundtrip() {
        let layout = DataLayout::Chunked {
            btree_address: Some(800),
            chunk_dims: vec![5, 100, 4],
        };
        let bytes = layout.serialize(8, 8);
        assert_eq!(bytes.len(), 3 + 8 + 12);
        assert_eq!(DataLayout::parse(&bytes, 8, 8).unwrap(), layout);
    }

    #[test]
    fn unallocated_contiguous() {
        let layout = DataLayout::Contiguous {
            address: None,
            size: 0,
        };
        assert_eq!(DataLayout::parse(&layout.serialize(8, 8), 8, 8).unwrap(), layout);
    }

    #[test]
    fn compact_roundtrip() {
        let layout = DataLayout::Compact {
            data: vec![1, 2, 3, 4],
        };
        assert_eq!(DataLayout::parse(&layout.serialize(8, 8), 8, 8).unwrap(), layout);
    }

    #[test]
    fn version_four_chunked_refused() {
        assert_eq!(
            DataLayout::parse(&[4, 2, 0, 0], 8, 8),
            Err(FormatError::InvalidLayoutVersion(4))
        );
    }
}
