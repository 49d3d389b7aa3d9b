//! Version 1 B-tree for raw data chunks (node type 1).
//!
//! Every node is written at full size (2K entries) even when partly used,
//! since readers size their node buffers from K alone.

use crate::cursor::{put_uint, Cursor, UNDEF_ADDR};
use crate::error::FormatError;

/// Half the node capacity.
pub const BTREE_K: usize = 32;
const NODE_ENTRIES: usize = 2 * BTREE_K;
const NODE_TYPE_CHUNK: u8 = 1;

/// One stored chunk: its element offsets (length = rank), file address and
/// byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub offsets: Vec<u64>,
    pub address: u64,
    pub size: u32,
}

fn key_size(rank: usize) -> usize {
    4 + 4 + 8 * (rank + 1)
}

/// Byte size of one node for a dataset of `rank` dimensions.
pub fn node_size(rank: usize) -> usize {
    4 + 1 + 1 + 2 + 8 + 8 + (NODE_ENTRIES + 1) * key_size(rank) + NODE_ENTRIES * 8
}

/// Number of nodes per level, leaves first.
fn level_counts(n_chunks: usize) -> Vec<usize> {
    let mut counts = Vec::new();
    let mut n = n_chunks;
    while n > 0 {
        let nodes = n.div_ceil(NODE_ENTRIES);
        counts.push(nodes);
        if nodes == 1 {
            break;
        }
        n = nodes;
    }
    counts
}

/// Total bytes of the tree indexing `n_chunks` chunks.
pub fn tree_size(n_chunks: usize, rank: usize) -> usize {
    level_counts(n_chunks).iter().sum::<usize>() * node_size(rank)
}

/// Offset of the root node from the start of the tree. Levels are laid out
/// leaves first, so the root is the last node written.
pub fn root_offset(n_chunks: usize, rank: usize) -> usize {
    let counts = level_counts(n_chunks);
    let below_root = counts.len().saturating_sub(1);
    counts[..below_root].iter().sum::<usize>() * node_size(rank)
}

#[derive(Clone)]
struct Key {
    size: u32,
    offsets: Vec<u64>,
}

fn put_key(buf: &mut Vec<u8>, key: &Key) {
    buf.extend_from_slice(&key.size.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // filter mask
    for &o in &key.offsets {
        put_uint(buf, o, 8);
    }
    put_uint(buf, 0, 8); // element-size dimension
}

fn put_node(
    buf: &mut Vec<u8>,
    level: u8,
    entries: &[(Key, u64)],
    last_key: &Key,
    siblings: (u64, u64),
    rank: usize,
) {
    let start = buf.len();
    buf.extend_from_slice(b"TREE");
    buf.push(NODE_TYPE_CHUNK);
    buf.push(level);
    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    put_uint(buf, siblings.0, 8);
    put_uint(buf, siblings.1, 8);
    for (key, child) in entries {
        put_key(buf, key);
        put_uint(buf, *child, 8);
    }
    put_key(buf, last_key);
    buf.resize(start + node_size(rank), 0);
}

/// Build the tree for `chunks` (sorted by offsets) at file address `base`.
///
/// `chunk_dims` are the chunk extents per dataset dimension. Returns the
/// node bytes and the root address, or `None` when there are no chunks.
pub fn build_chunk_tree(chunks: &[ChunkRecord], chunk_dims: &[u64], base: u64) -> (Vec<u8>, Option<u64>) {
    let Some(last) = chunks.last() else {
        return (Vec::new(), None);
    };
    let rank = chunk_dims.len();
    let nsize = node_size(rank) as u64;
    let final_key = Key {
        size: 0,
        offsets: last.offsets.iter().zip(chunk_dims).map(|(o, d)| o + d).collect(),
    };

    // Entries of the current level: (first key below, child address).
    let mut entries: Vec<(Key, u64)> = chunks
        .iter()
        .map(|c| {
            (
                Key {
                    size: c.size,
                    offsets: c.offsets.clone(),
                },
                c.address,
            )
        })
        .collect();

    let mut buf = Vec::with_capacity(tree_size(chunks.len(), rank));
    let mut level = 0u8;
    loop {
        let groups: Vec<&[(Key, u64)]> = entries.chunks(NODE_ENTRIES).collect();
        let first_addr = base + buf.len() as u64;
        let mut parents = Vec::with_capacity(groups.len());
        for (i, group) in groups.iter().enumerate() {
            let addr = first_addr + i as u64 * nsize;
            let left = if i == 0 { UNDEF_ADDR } else { addr - nsize };
            let right = if i + 1 == groups.len() { UNDEF_ADDR } else { addr + nsize };
            let upper = groups.get(i + 1).map_or(&final_key, |next| &next[0].0);
            put_node(&mut buf, level, group, upper, (left, right), rank);
            parents.push((group[0].0.clone(), addr));
        }
        if parents.len() == 1 {
            return (buf, Some(parents[0].1));
        }
        entries = parents;
        level += 1;
    }
}

/// Walk the tree at `address` and return every chunk it indexes.
pub fn collect_chunks(data: &[u8], address: u64, rank: usize) -> Result<Vec<ChunkRecord>, FormatError> {
    let mut out = Vec::new();
    walk(data, address, rank, &mut out)?;
    Ok(out)
}

fn walk(data: &[u8], address: u64, rank: usize, out: &mut Vec<ChunkRecord>) -> Result<(), FormatError> {
    let mut c = Cursor::at(data, address as usize);
    if c.bytes(4)? != b"TREE" {
        return Err(FormatError::InvalidBTreeSignature);
    }
    let node_type = c.u8()?;
    if node_type != NODE_TYPE_CHUNK {
        return Err(FormatError::InvalidBTreeNodeType(node_type));
    }
    let level = c.u8()?;
    let used = c.u16()? as usize;
    c.skip(16)?; // siblings

    for _ in 0..used {
        let size = c.u32()?;
        let filter_mask = c.u32()?;
        if filter_mask != 0 {
            return Err(FormatError::UnsupportedDatatype("filtered chunk".into()));
        }
        let offsets = (0..rank).map(|_| c.u64()).collect::<Result<Vec<_>, _>>()?;
        c.skip(8)?;
        let child = c.u64()?;
        if level == 0 {
            out.push(ChunkRecord {
                offsets,
                address: child,
                size,
            });
        } else {
            walk(data, child, rank, out)?;
        }
    }
    Ok(())
}
