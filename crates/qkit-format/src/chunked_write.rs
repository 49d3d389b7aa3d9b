//! Splitting a dense row-major buffer into chunks and indexing them.

use crate::btree_v1::{build_chunk_tree, tree_size, ChunkRecord};

/// Chunk grid coordinates (in elements) of every chunk that intersects the
/// extent, in row-major order. Empty when any extent is zero.
pub fn chunk_offsets(shape: &[u64], chunk_dims: &[u64]) -> Vec<Vec<u64>> {
    if shape.iter().any(|&d| d == 0) {
        return Vec::new();
    }
    let counts: Vec<u64> = shape.iter().zip(chunk_dims).map(|(s, c)| s.div_ceil(*c)).collect();
    let total: u64 = counts.iter().product();
    (0..total)
        .map(|linear| {
            let mut rest = linear;
            let mut offsets = vec![0u64; shape.len()];
            for d in (0..shape.len()).rev() {
                offsets[d] = (rest % counts[d]) * chunk_dims[d];
                rest /= counts[d];
            }
            offsets
        })
        .collect()
}

/// Copy one chunk out of `raw`, padding the part past the extent with `fill`.
pub fn extract_chunk(
    raw: &[u8],
    shape: &[u64],
    chunk_dims: &[u64],
    offsets: &[u64],
    fill: &[u8],
) -> Vec<u8> {
    let elem = fill.len();
    let rank = shape.len();
    let chunk_elems: usize = chunk_dims.iter().map(|&d| d as usize).product();
    let mut out: Vec<u8> = fill.iter().copied().cycle().take(chunk_elems * elem).collect();

    let inner = chunk_dims[rank - 1] as usize;
    let inner_valid = (shape[rank - 1] - offsets[rank - 1]).min(chunk_dims[rank - 1]) as usize;
    let rows = chunk_elems / inner;

    // One contiguous run per chunk row along the last axis.
    for row in 0..rows {
        let mut rest = row;
        let mut src = 0usize;
        let mut inside = true;
        for d in (0..rank - 1).rev() {
            let local = rest % chunk_dims[d] as usize;
            rest /= chunk_dims[d] as usize;
            let global = offsets[d] as usize + local;
            if global >= shape[d] as usize {
                inside = false;
                break;
            }
            let stride: usize = shape[d + 1..].iter().map(|&s| s as usize).product();
            src += global * stride;
        }
        if !inside {
            continue;
        }
        src += offsets[rank - 1] as usize;
        let dst = row * inner * elem;
        let src = src * elem;
        out[dst..dst + inner_valid * elem].copy_from_slice(&raw[src..src + inner_valid * elem]);
    }
    out
}

/// A chunked dataset's storage: the B-tree followed by the chunk bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedBlob {
    pub bytes: Vec<u8>,
    pub btree_address: Option<u64>,
}

/// Total size of the blob [`build_chunked`] produces, without building it.
pub fn chunked_size(shape: &[u64], chunk_dims: &[u64], elem_size: usize) -> usize {
    let n = chunk_offsets(shape, chunk_dims).len();
    let chunk_bytes: usize = chunk_dims.iter().map(|&d| d as usize).product::<usize>() * elem_size;
    tree_size(n, shape.len()) + n * chunk_bytes
}

/// Lay out the tree and chunks for a dataset placed at `base`.
///
/// `raw` is the dense row-major buffer of `shape`, `fill` one element of
/// padding for edge chunks.
pub fn build_chunked(raw: &[u8], shape: &[u64], chunk_dims: &[u64], fill: &[u8], base: u64) -> ChunkedBlob {
    let offsets = chunk_offsets(shape, chunk_dims);
    let chunk_bytes: usize = chunk_dims.iter().map(|&d| d as usize).product::<usize>() * fill.len();
    let data_start = base + tree_size(offsets.len(), shape.len()) as u64;

    let records: Vec<ChunkRecord> = offsets
        .iter()
        .enumerate()
        .map(|(i, o)| ChunkRecord {
            offsets: o.clone(),
            address: data_start + (i * chunk_bytes) as u64,
            size: chunk_bytes as u32,
        })
        .collect();
    let (mut bytes, btree_address) = build_chunk_tree(&records, chunk_dims, base);
    for o in &offsets {
        bytes.extend(extract_chunk(raw, shape, chunk_dims, o, fill));
    }
    ChunkedBlob {
        bytes,
        btree_address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(values: &[u8]) -> Vec<u8> {
        values.to_vec()
    }

    #[test]
    fn grid_covers_extent() {
        let offs = chunk_offsets(&[7, 3], &[5, 3]);
        assert_eq!(offs, vec![vec![0, 0], vec![5, 0]]);
        assert!(chunk_offsets(&[0, 3], &[5, 3]).is_empty());
    }

    #[test]
    fn edge_chunk_is_padded() {
        // 2x3 matrix, chunks of 2x2, one-byte elements, fill 0xEE
        let raw = bytes_of(&[1, 2, 3, 4, 5, 6]);
        let right = extract_chunk(&raw, &[2, 3], &[2, 2], &[0, 2], &[0xEE]);
        assert_eq!(right, vec![3, 0xEE, 6, 0xEE]);
        let left = extract_chunk(&raw, &[2, 3], &[2, 2], &[0, 0], &[0xEE]);
        assert_eq!(left, vec![1, 2, 4, 5]);
    }

    #[test]
    fn rows_past_extent_are_fill() {
        let raw = bytes_of(&[1, 2]);
        let chunk = extract_chunk(&raw, &[1, 2], &[5, 2], &[0, 0], &[9]);
        assert_eq!(chunk, vec![1, 2, 9, 9, 9, 9, 9, 9, 9, 9]);
    }

    #[test]
    fn three_dimensional_chunk() {
        let raw: Vec<u8> = (0..12).collect();
        // shape (2, 2, 3), chunk (5, 5, 3) holds everything plus fill
        let chunk = extract_chunk(&raw, &[2, 2, 3], &[5, 5, 3], &[0, 0, 0], &[0xFF]);
        assert_eq!(&chunk[..6], &[0, 1, 2, 3, 4, 5]);
        assert_eq!(&chunk[15..21], &[6, 7, 8, 9, 10, 11]);
        assert!(chunk[6..15].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn blob_size_matches_prediction() {
        let raw: Vec<u8> = (0..80).collect();
        let blob = build_chunked(&raw, &[10, 2], &[4, 2], &[0, 0], 4096);
        assert_eq!(blob.bytes.len(), chunked_size(&[10, 2], &[4, 2], 2));
        assert_eq!(blob.btree_address, Some(4096));
    }
}
