//! Reassembling a dense buffer from B-tree indexed chunks.

use crate::btree_v1::collect_chunks;
use crate::cursor::Cursor;
use crate::error::FormatError;

/// Read every chunk under `btree_address` into a row-major buffer of
/// `shape`. Elements no chunk covers keep the `fill` bytes.
pub fn read_chunked(
    file: &[u8],
    btree_address: Option<u64>,
    shape: &[u64],
    chunk_dims: &[u64],
    fill: &[u8],
) -> Result<Vec<u8>, FormatError> {
    let elem = fill.len();
    let rank = shape.len();
    let total: usize = shape.iter().map(|&d| d as usize).product();
    let mut out: Vec<u8> = fill.iter().copied().cycle().take(total * elem).collect();
    let Some(root) = btree_address else {
        return Ok(out);
    };
    if total == 0 {
        return Ok(out);
    }

    let chunk_elems: usize = chunk_dims.iter().map(|&d| d as usize).product();
    let inner = chunk_dims[rank - 1] as usize;
    for rec in collect_chunks(file, root, rank)? {
        let chunk = Cursor::at(file, rec.address as usize).bytes(chunk_elems * elem)?;
        if rec.offsets[rank - 1] >= shape[rank - 1] {
            continue;
        }
        let inner_valid = (shape[rank - 1] - rec.offsets[rank - 1]).min(chunk_dims[rank - 1]) as usize;
        for row in 0..chunk_elems / inner {
            let mut rest = row;
            let mut dst = 0usize;
            let mut inside = true;
            for d in (0..rank - 1).rev() {
                let local = rest % chunk_dims[d] as usize;
                rest /= chunk_dims[d] as usize;
                let global = rec.offsets[d] as usize + local;
                if global >= shape[d] as usize {
                    inside = false;
                    break;
                }
                let stride: usize = shape[d + 1..].iter().map(|&s| s as usize).product();
                dst += global * stride;
            }
            if !inside {
                continue;
            }
            let dst = (dst + rec.offsets[rank - 1] as usize) * elem;
            let src = row * inner * elem;
            out[dst..dst + inner_valid * elem].copy_from_slice(&chunk[src..src + inner_valid * elem]);
        }
    }
    Ok(out)
}
