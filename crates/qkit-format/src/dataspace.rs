//! HDF5 Dataspace message (type 0x0001).

use crate::cursor::{put_uint, Cursor};
use crate::error::FormatError;

/// Marker for an unlimited maximum dimension.
pub const UNLIMITED: u64 = u64::MAX;

/// Type of dataspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    /// A single element.
    Scalar,
    /// An N-dimensional array.
    Simple,
    /// No elements at all.
    Null,
}

/// Parsed dataspace message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    pub space_type: DataspaceType,
    /// Current dimension sizes (empty for scalar and null).
    pub dimensions: Vec<u64>,
    /// Maximum dimension sizes, if recorded. [`UNLIMITED`] means unlimited.
    pub max_dimensions: Option<Vec<u64>>,
}

impl Dataspace {
    pub fn scalar() -> Self {
        Self {
            space_type: DataspaceType::Scalar,
            dimensions: Vec::new(),
            max_dimensions: None,
        }
    }

    pub fn simple(dimensions: &[u64], max_dimensions: Option<&[u64]>) -> Self {
        Self {
            space_type: DataspaceType::Simple,
            dimensions: dimensions.to_vec(),
            max_dimensions: max_dimensions.map(<[u64]>::to_vec),
        }
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Total number of elements. Scalar = 1, Null = 0.
    pub fn num_elements(&self) -> u64 {
        match self.space_type {
            DataspaceType::Null => 0,
            DataspaceType::Scalar => 1,
            DataspaceType::Simple => self.dimensions.iter().product(),
        }
    }

    /// Parse a version 1 or 2 dataspace message.
    pub fn parse(data: &[u8], length_size: u8) -> Result<Dataspace, FormatError> {
        let mut c = Cursor::new(data);
        let version = c.u8()?;
        let rank = c.u8()? as usize;
        let flags = c.u8()?;
        let space_type = match version {
            1 => {
                c.skip(5)?;
                if rank == 0 {
                    DataspaceType::Scalar
                } else {
                    DataspaceType::Simple
                }
            }
            2 => match c.u8()? {
                0 => DataspaceType::Scalar,
                1 => DataspaceType::Simple,
                2 => DataspaceType::Null,
                other => return Err(FormatError::InvalidDataspaceType(other)),
            },
            other => return Err(FormatError::InvalidDataspaceVersion(other)),
        };

        let dimensions = (0..rank)
            .map(|_| c.uint(length_size))
            .collect::<Result<Vec<_>, _>>()?;
        let max_dimensions = if flags & 0x01 != 0 {
            Some(
                (0..rank)
                    .map(|_| c.uint(length_size))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        } else {
            None
        };

        Ok(Dataspace {
            space_type,
            dimensions,
            max_dimensions,
        })
    }

    /// Serialize as a version 2 message.
    pub fn serialize(&self, length_size: u8) -> Vec<u8> {
        let mut buf = vec![
            2,
            self.dimensions.len() as u8,
            u8::from(self.max_dimensions.is_some()),
            match self.space_type {
                DataspaceType::Scalar => 0,
                DataspaceType::Simple => 1,
                DataspaceType::Null => 2,
            },
        ];
        for &dim in &self.dimensions {
            put_uint(&mut buf, dim, length_size);
        }
        for &max in self.max_dimensions.iter().flatten() {
            put_uint(&mut buf, max, length_size);
        }
        buf
    }
}
