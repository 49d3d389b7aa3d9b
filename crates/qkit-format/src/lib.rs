//! HDF5 binary structures for the qkit measurement store.
//!
//! This crate reads and writes the subset of the HDF5 format that the store
//! produces: v3 superblocks, v2 object headers, compact groups, contiguous
//! and v1 B-tree chunked datasets, and attributes. Everything operates on
//! byte slices; file access lives in `qkit-store`.

pub mod attribute;
pub mod btree_v1;
pub mod checksum;
pub mod chunked_read;
pub mod chunked_write;
pub(crate) mod cursor;
pub mod data_layout;
pub mod data_read;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod file_reader;
pub mod file_writer;
pub mod fill_value;
pub mod link_message;
pub mod message_type;
pub mod object_header;
pub mod object_header_writer;
pub mod signature;
pub mod superblock;
pub mod tree;

pub use attribute::AttrValue;
pub use cursor::UNDEF_ADDR;
pub use dataspace::UNLIMITED;
pub use error::FormatError;
pub use tree::{Attributes, DataBuffer, DatasetNode, ElementType, GroupNode, Node};
