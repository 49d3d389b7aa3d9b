//! Parsing a file image back into a [`GroupNode`] tree.

use std::collections::HashSet;

use crate::attribute::AttributeMessage;
use crate::chunked_read::read_chunked;
use crate::cursor::Cursor;
use crate::data_layout::DataLayout;
use crate::data_read::{decode_f64, decode_strings};
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::fill_value;
use crate::link_message::{check_link_info, LinkMessage, LinkTarget};
use crate::message_type::MessageType;
use crate::object_header::ObjectHeader;
use crate::signature::find_signature;
use crate::superblock::Superblock;
use crate::tree::{Attributes, DataBuffer, DatasetNode, GroupNode, Node};

struct Reader<'a> {
    file: &'a [u8],
    offset_size: u8,
    length_size: u8,
    /// Object headers on the current path, to break hard-link cycles.
    ancestors: HashSet<u64>,
}

/// Parse a complete file image.
///
/// Soft and external links are skipped, as are attributes whose type has no
/// [`crate::attribute::AttrValue`] counterpart.
pub fn parse(bytes: &[u8]) -> Result<(Superblock, GroupNode), FormatError> {
    let sig = find_signature(bytes)?;
    let sb = Superblock::parse(bytes, sig)?;
    let file = bytes
        .get(sb.base_address as usize..)
        .ok_or(FormatError::UnexpectedEof {
            expected: sb.base_address as usize,
            available: bytes.len(),
        })?;
    let mut reader = Reader {
        file,
        offset_size: sb.offset_size,
        length_size: sb.length_size,
        ancestors: HashSet::new(),
    };
    let root = reader.group(sb.root_group_address)?;
    Ok((sb, root))
}

impl Reader<'_> {
    fn header(&self, address: u64) -> Result<ObjectHeader, FormatError> {
        ObjectHeader::parse(self.file, address as usize, self.offset_size, self.length_size)
    }

    fn attributes(&self, header: &ObjectHeader) -> Attributes {
        let mut attrs = Attributes::new();
        for msg in header.all(MessageType::Attribute) {
            let decoded = AttributeMessage::parse(&msg.data, self.length_size)
                .and_then(|a| Ok((a.value()?, a.name)));
            if let Ok((value, name)) = decoded {
                attrs.set(&name, value);
            }
        }
        attrs
    }

    fn group(&mut self, address: u64) -> Result<GroupNode, FormatError> {
        let header = self.header(address)?;
        if header.find(MessageType::SymbolTable).is_some() {
            return Err(FormatError::UnsupportedMessage(MessageType::SymbolTable.to_u16()));
        }
        if let Some(info) = header.find(MessageType::LinkInfo) {
            check_link_info(&info.data, self.offset_size)?;
        }
        self.ancestors.insert(address);
        let mut group = GroupNode::new();
        group.attrs = self.attributes(&header);
        for msg in header.all(MessageType::Link) {
            let link = LinkMessage::parse(&msg.data, self.offset_size)?;
            let LinkTarget::Hard(child) = link.target else {
                continue;
            };
            if self.ancestors.contains(&child) {
                continue;
            }
            let node = self.object(child)?;
            group.insert(&link.name, node)?;
        }
        self.ancestors.remove(&address);
        Ok(group)
    }

    fn object(&mut self, address: u64) -> Result<Node, FormatError> {
        let header = self.header(address)?;
        if header.find(MessageType::DataLayout).is_some() {
            Ok(Node::Dataset(self.dataset(&header)?))
        } else {
            Ok(Node::Group(self.group(address)?))
        }
    }

    fn dataset(&self, header: &ObjectHeader) -> Result<DatasetNode, FormatError> {
        if header.find(MessageType::FilterPipeline).is_some() {
            return Err(FormatError::UnsupportedDatatype("filtered dataset".into()));
        }
        let (datatype, _) = Datatype::parse(header.require(MessageType::Datatype)?)?;
        let dataspace = Dataspace::parse(header.require(MessageType::Dataspace)?, self.length_size)?;
        let layout = DataLayout::parse(
            header.require(MessageType::DataLayout)?,
            self.offset_size,
            self.length_size,
        )?;
        let elem = datatype.type_size() as usize;
        let fill = match header.find(MessageType::FillValue) {
            Some(msg) => fill_value::parse(&msg.data)?,
            None => None,
        }
        .filter(|f| f.len() == elem)
        .unwrap_or_else(|| vec![0u8; elem]);

        let shape = dataspace.dimensions.clone();
        let count = dataspace.num_elements() as usize;
        let (raw, chunks) = match &layout {
            DataLayout::Compact { data } => (data.clone(), None),
            DataLayout::Contiguous { address: None, .. } => {
                (fill.iter().copied().cycle().take(count * elem).collect(), None)
            }
            DataLayout::Contiguous {
                address: Some(addr),
                ..
            } => {
                let mut c = Cursor::at(self.file, *addr as usize);
                (c.bytes(count * elem)?.to_vec(), None)
            }
            DataLayout::Chunked {
                btree_address,
                chunk_dims,
            } => {
                if chunk_dims.len() != shape.len() + 1 {
                    return Err(FormatError::RankMismatch {
                        expected: shape.len() + 1,
                        actual: chunk_dims.len(),
                    });
                }
                let dims: Vec<u64> = chunk_dims[..shape.len()].iter().map(|&d| u64::from(d)).collect();
                let raw = read_chunked(self.file, *btree_address, &shape, &dims, &fill)?;
                (raw, Some(dims))
            }
        };

        let data = match &datatype {
            Datatype::String { .. } => DataBuffer::Text(decode_strings(&raw, &datatype, count)?),
            Datatype::FloatingPoint { size: 4, .. } => DataBuffer::F32(
                decode_f64(&raw, &datatype, count)?
                    .into_iter()
                    .map(|v| v as f32)
                    .collect(),
            ),
            _ => DataBuffer::F64(decode_f64(&raw, &datatype, count)?),
        };

        Ok(DatasetNode {
            data,
            shape,
            max_shape: dataspace.max_dimensions,
            chunks,
            attrs: self.attributes(header),
        })
    }
}
