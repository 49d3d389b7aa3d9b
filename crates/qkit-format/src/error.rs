//! Error types for HDF5 format parsing and serialization.

use std::fmt;

use crate::message_type::MessageType;

/// Errors raised while encoding, decoding or manipulating HDF5 structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The HDF5 magic signature was not found at any valid offset.
    SignatureNotFound,
    /// The superblock version is not supported.
    UnsupportedVersion(u8),
    /// Unexpected end of data.
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// Invalid offset size (only 8 is produced, 2/4/8 are accepted on read).
    InvalidOffsetSize(u8),
    /// Invalid length size.
    InvalidLengthSize(u8),
    /// Invalid object header signature.
    InvalidObjectHeaderSignature,
    /// Invalid object header version.
    InvalidObjectHeaderVersion(u8),
    /// Unknown message type that is marked as must-understand.
    UnsupportedMessage(u16),
    /// Jenkins lookup3 checksum mismatch.
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// Dataspace message version is not 1 or 2.
    InvalidDataspaceVersion(u8),
    /// Unknown dataspace type byte.
    InvalidDataspaceType(u8),
    /// Unknown or unsupported datatype class.
    InvalidDatatypeClass(u8),
    /// A datatype that parses but cannot be decoded into values.
    UnsupportedDatatype(String),
    /// Unknown string padding value.
    InvalidStringPadding(u8),
    /// Unknown character set value.
    InvalidCharset(u8),
    /// Data layout message version is not 3 or 4.
    InvalidLayoutVersion(u8),
    /// Unknown data layout class.
    InvalidLayoutClass(u8),
    /// Attribute message version is not 1, 2 or 3.
    InvalidAttributeVersion(u8),
    /// Link message version is not 1.
    InvalidLinkVersion(u8),
    /// Groups using fractal-heap (dense) link storage are not readable.
    DenseLinkStorage,
    /// B-tree node does not start with "TREE".
    InvalidBTreeSignature,
    /// B-tree node type is not the raw-data chunk type.
    InvalidBTreeNodeType(u8),
    /// An object header lacks a message required for its kind.
    MissingMessage(MessageType),
    /// A header message payload does not fit the 16-bit size field.
    MessageTooLarge(usize),
    /// A name or path component is empty or contains `/`.
    InvalidName(String),
    /// A buffer length does not agree with the dataset shape.
    ShapeMismatch {
        /// Element count implied by the shape.
        expected: usize,
        /// Element count actually supplied.
        actual: usize,
    },
    /// A resize changes the number of dimensions.
    RankMismatch {
        /// Rank of the dataset.
        expected: usize,
        /// Rank of the requested shape.
        actual: usize,
    },
    /// A resize exceeds a finite maximum dimension.
    ExceedsMaxShape {
        /// Axis index.
        axis: usize,
        /// Requested extent.
        requested: u64,
        /// Maximum extent.
        max: u64,
    },
    /// A write starts or ends past the end of the buffer.
    IndexOutOfBounds {
        /// First element index past the write.
        end: usize,
        /// Number of elements in the buffer.
        len: usize,
    },
    /// Text written to a numeric dataset, or numbers written to text.
    TypeMismatch {
        /// Element type of the dataset.
        expected: &'static str,
        /// Kind of the supplied values.
        actual: &'static str,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::SignatureNotFound => {
                write!(f, "HDF5 signature not found at any valid offset")
            }
            FormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported superblock version: {v}")
            }
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::InvalidOffsetSize(s) => write!(f, "invalid offset size: {s}"),
            FormatError::InvalidLengthSize(s) => write!(f, "invalid length size: {s}"),
            FormatError::InvalidObjectHeaderSignature => {
                write!(f, "invalid object header signature")
            }
            FormatError::InvalidObjectHeaderVersion(v) => {
                write!(f, "invalid object header version: {v}")
            }
            FormatError::UnsupportedMessage(id) => {
                write!(
                    f,
                    "unsupported message type {id:#06x} marked as must-understand"
                )
            }
            FormatError::ChecksumMismatch { expected, computed } => {
                write!(
                    f,
                    "checksum mismatch: expected {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::InvalidDataspaceVersion(v) => {
                write!(f, "invalid dataspace version: {v}")
            }
            FormatError::InvalidDataspaceType(t) => write!(f, "invalid dataspace type: {t}"),
            FormatError::InvalidDatatypeClass(c) => write!(f, "invalid datatype class: {c}"),
            FormatError::UnsupportedDatatype(what) => write!(f, "unsupported datatype: {what}"),
            FormatError::InvalidStringPadding(p) => write!(f, "invalid string padding: {p}"),
            FormatError::InvalidCharset(c) => write!(f, "invalid character set: {c}"),
            FormatError::InvalidLayoutVersion(v) => write!(f, "invalid layout version: {v}"),
            FormatError::InvalidLayoutClass(c) => write!(f, "invalid layout class: {c}"),
            FormatError::InvalidAttributeVersion(v) => {
                write!(f, "invalid attribute message version: {v}")
            }
            FormatError::InvalidLinkVersion(v) => write!(f, "invalid link message version: {v}"),
            FormatError::DenseLinkStorage => {
                write!(f, "groups with dense link storage are not supported")
            }
            FormatError::InvalidBTreeSignature => write!(f, "invalid B-tree node signature"),
            FormatError::InvalidBTreeNodeType(t) => {
                write!(f, "unexpected B-tree node type {t}, expected raw data chunks")
            }
            FormatError::MissingMessage(mt) => write!(f, "missing required message: {mt:?}"),
            FormatError::MessageTooLarge(n) => {
                write!(f, "header message of {n} bytes exceeds 65535")
            }
            FormatError::InvalidName(name) => write!(f, "invalid object name: {name:?}"),
            FormatError::ShapeMismatch { expected, actual } => {
                write!(f, "shape holds {expected} elements, buffer has {actual}")
            }
            FormatError::RankMismatch { expected, actual } => {
                write!(f, "rank mismatch: dataset has {expected} dimensions, got {actual}")
            }
            FormatError::ExceedsMaxShape {
                axis,
                requested,
                max,
            } => {
                write!(
                    f,
                    "extent {requested} on axis {axis} exceeds maximum {max}"
                )
            }
            FormatError::IndexOutOfBounds { end, len } => {
                write!(f, "write ending at element {end} exceeds buffer of {len}")
            }
            FormatError::TypeMismatch { expected, actual } => {
                write!(f, "cannot store {actual} values in a {expected} dataset")
            }
        }
    }
}

impl std::error::Error for FormatError {}
