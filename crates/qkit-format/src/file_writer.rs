//! Serializing a [`GroupNode`] tree into a complete HDF5 file image.
//!
//! Layout: superblock, then every object header in depth-first order (the
//! root group directly after the superblock), then the raw data of each
//! dataset in the same order. Header sizes do not depend on the addresses
//! they contain, so a first pass with placeholder addresses fixes every
//! offset before the real headers are built.

use crate::attribute::AttributeMessage;
use crate::btree_v1::root_offset;
use crate::chunked_write::{build_chunked, chunk_offsets, chunked_size};
use crate::data_layout::DataLayout;
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::fill_value::{self, AllocTime};
use crate::link_message::{serialize_group_info, serialize_link_info, LinkMessage};
use crate::message_type::MessageType;
use crate::object_header_writer::{ObjectHeaderWriter, MSG_CONSTANT};
use crate::superblock::{Superblock, SUPERBLOCK_SIZE};
use crate::tree::{Attributes, DataBuffer, DatasetNode, GroupNode, Node};

const OFFSET_SIZE: u8 = 8;
const LENGTH_SIZE: u8 = 8;

enum Flat<'a> {
    Group {
        node: &'a GroupNode,
        children: Vec<(&'a str, usize)>,
    },
    Dataset(EncodedDataset<'a>),
}

/// A dataset with its elements already encoded to file bytes.
struct EncodedDataset<'a> {
    node: &'a DatasetNode,
    datatype: Datatype,
    raw: Vec<u8>,
    fill: Vec<u8>,
}

impl EncodedDataset<'_> {
    /// Where the chunk index root sits inside the data block.
    fn root_offset(&self, chunks: &[u64]) -> usize {
        let n = chunk_offsets(&self.node.shape, chunks).len();
        root_offset(n, chunks.len())
    }

    fn data_size(&self) -> usize {
        match &self.node.chunks {
            Some(chunks) => chunked_size(&self.node.shape, chunks, self.fill.len()),
            None => self.raw.len(),
        }
    }
}

fn encode(node: &DatasetNode) -> EncodedDataset<'_> {
    let (datatype, raw, fill) = match &node.data {
        DataBuffer::F32(v) => (
            Datatype::f32(),
            v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            f32::NAN.to_le_bytes().to_vec(),
        ),
        DataBuffer::F64(v) => (
            Datatype::f64(),
            v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            f64::NAN.to_le_bytes().to_vec(),
        ),
        DataBuffer::Text(v) => {
            let width = v.iter().map(String::len).max().unwrap_or(0).max(1);
            let mut raw = Vec::with_capacity(width * v.len());
            for s in v {
                raw.extend_from_slice(s.as_bytes());
                raw.resize(raw.len() + width - s.len(), 0);
            }
            (Datatype::utf8(width as u32), raw, vec![0u8; width])
        }
    };
    EncodedDataset {
        node,
        datatype,
        raw,
        fill,
    }
}

fn flatten<'a>(group: &'a GroupNode, out: &mut Vec<Flat<'a>>) -> usize {
    let idx = out.len();
    out.push(Flat::Group {
        node: group,
        children: Vec::new(),
    });
    let mut children = Vec::with_capacity(group.len());
    for (name, child) in group.children() {
        let child_idx = match child {
            Node::Group(g) => flatten(g, out),
            Node::Dataset(d) => {
                out.push(Flat::Dataset(encode(d)));
                out.len() - 1
            }
        };
        children.push((name, child_idx));
    }
    if let Flat::Group { children: slot, .. } = &mut out[idx] {
        *slot = children;
    }
    idx
}

fn add_attributes(w: &mut ObjectHeaderWriter, attrs: &Attributes) {
    for (name, value) in attrs.iter() {
        let msg = AttributeMessage::from_value(name, value);
        w.add_message(MessageType::Attribute, msg.serialize(LENGTH_SIZE));
    }
}

fn group_header(group: &GroupNode, links: &[LinkMessage]) -> Result<Vec<u8>, FormatError> {
    let mut w = ObjectHeaderWriter::new();
    w.add_message(MessageType::LinkInfo, serialize_link_info(OFFSET_SIZE));
    w.add_message(MessageType::GroupInfo, serialize_group_info());
    for link in links {
        w.add_message(MessageType::Link, link.serialize(OFFSET_SIZE));
    }
    add_attributes(&mut w, &group.attrs);
    w.serialize()
}

fn dataset_header(ds: &EncodedDataset<'_>, data_address: Option<u64>) -> Result<Vec<u8>, FormatError> {
    let node = ds.node;
    let dataspace = if node.shape.is_empty() {
        Dataspace::scalar()
    } else {
        Dataspace::simple(&node.shape, node.max_shape.as_deref())
    };
    let (alloc, layout) = match &node.chunks {
        Some(chunks) => {
            let mut chunk_dims: Vec<u32> = chunks.iter().map(|&c| c as u32).collect();
            chunk_dims.push(ds.fill.len() as u32);
            (
                AllocTime::Incremental,
                DataLayout::Chunked {
                    btree_address: data_address.map(|base| base + ds.root_offset(chunks) as u64),
                    chunk_dims,
                },
            )
        }
        None => (
            AllocTime::Late,
            DataLayout::Contiguous {
                address: data_address,
                size: ds.raw.len() as u64,
            },
        ),
    };

    let mut w = ObjectHeaderWriter::new();
    w.add_message_with_flags(MessageType::Datatype, ds.datatype.serialize(), MSG_CONSTANT);
    w.add_message(MessageType::Dataspace, dataspace.serialize(LENGTH_SIZE));
    w.add_message_with_flags(
        MessageType::FillValue,
        fill_value::serialize(alloc, Some(&ds.fill)),
        MSG_CONSTANT,
    );
    w.add_message(MessageType::DataLayout, layout.serialize(OFFSET_SIZE, LENGTH_SIZE));
    add_attributes(&mut w, &node.attrs);
    w.serialize()
}

/// Build every header given object and data addresses (`None` while
/// sizing).
fn build_headers(
    flat: &[Flat<'_>],
    object_addrs: &[u64],
    data_addrs: &[Option<u64>],
) -> Result<Vec<Vec<u8>>, FormatError> {
    flat.iter()
        .enumerate()
        .map(|(i, obj)| match obj {
            Flat::Group { node, children } => {
                let links: Vec<LinkMessage> = children
                    .iter()
                    .map(|&(name, child)| LinkMessage::hard(name, object_addrs[child]))
                    .collect();
                group_header(node, &links)
            }
            Flat::Dataset(ds) => dataset_header(ds, data_addrs[i]),
        })
        .collect()
}

/// Serialize `root` into a file image whose superblock carries
/// `consistency_flags`.
pub fn serialize(root: &GroupNode, consistency_flags: u8) -> Result<Vec<u8>, FormatError> {
    let mut flat = Vec::new();
    flatten(root, &mut flat);

    // Pass 1: sizes.
    let placeholders = vec![0u64; flat.len()];
    let no_data = vec![Some(0u64); flat.len()];
    let sizes: Vec<usize> = build_headers(&flat, &placeholders, &no_data)?
        .iter()
        .map(Vec::len)
        .collect();

    let mut object_addrs = Vec::with_capacity(flat.len());
    let mut cursor = SUPERBLOCK_SIZE as u64;
    for size in &sizes {
        object_addrs.push(cursor);
        cursor += *size as u64;
    }
    let mut data_addrs = vec![None; flat.len()];
    for (i, obj) in flat.iter().enumerate() {
        if let Flat::Dataset(ds) = obj {
            let size = ds.data_size();
            if size > 0 {
                data_addrs[i] = Some(cursor);
                cursor += size as u64;
            }
        }
    }

    // Pass 2: real headers, then data.
    let headers = build_headers(&flat, &object_addrs, &data_addrs)?;
    let sb = Superblock::new_v3(cursor, object_addrs[0], consistency_flags);
    let mut out = Vec::with_capacity(cursor as usize);
    out.extend_from_slice(&sb.serialize());
    for header in headers {
        out.extend(header);
    }
    for (i, obj) in flat.iter().enumerate() {
        let (Flat::Dataset(ds), Some(addr)) = (obj, data_addrs[i]) else {
            continue;
        };
        match &ds.node.chunks {
            Some(chunks) => {
                let blob = build_chunked(&ds.raw, &ds.node.shape, chunks, &ds.fill, addr);
                debug_assert_eq!(blob.btree_address, Some(addr + ds.root_offset(chunks) as u64));
                out.extend(blob.bytes);
            }
            None => out.extend_from_slice(&ds.raw),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::superblock::FLAG_WRITE_ACCESS;
    use crate::tree::ElementType;

    #[test]
    fn empty_root() {
        let bytes = serialize(&GroupNode::new(), 0).unwrap();
        let sb = Superblock::parse(&bytes, 0).unwrap();
        assert_eq!(sb.root_group_address, SUPERBLOCK_SIZE as u64);
        assert_eq!(sb.eof_address, bytes.len() as u64);
    }

    #[test]
    fn flags_reach_superblock() {
        let bytes = serialize(&GroupNode::new(), FLAG_WRITE_ACCESS).unwrap();
        assert!(Superblock::parse(&bytes, 0).unwrap().writer_active());
    }

    #[test]
    fn eof_covers_chunk_data() {
        let mut root = GroupNode::new();
        let mut ds = DatasetNode::new(ElementType::F64, &[0, 0], Some(&[u64::MAX; 2]), Some(&[5, 10]));
        ds.resize(&[7, 10]).unwrap();
        root.insert("m", Node::Dataset(ds)).unwrap();
        let bytes = serialize(&root, 0).unwrap();
        let sb = Superblock::parse(&bytes, 0).unwrap();
        assert_eq!(sb.eof_address, bytes.len() as u64);
        // two chunks of 5 x 10 doubles
        assert!(bytes.len() > 2 * 5 * 10 * 8);
    }

    #[test]
    fn oversized_attribute_is_an_error() {
        let mut root = GroupNode::new();
        root.attrs.set("huge", "x".repeat(70_000));
        assert!(matches!(
            serialize(&root, 0),
            Err(FormatError::MessageTooLarge(_))
        ));
    }
}
