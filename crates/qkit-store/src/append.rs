//! Placement of one payload into a resizable dataset.
//!
//! Where a payload lands depends on the dataset's rank. The `fill`
//! attribute (`[i64; 3]`) records how much of each axis has been written:
//!
//! | rank | `fill[0]`        | `fill[1]`               | `fill[2]`     |
//! |------|------------------|-------------------------|---------------|
//! | 1    | length           | 0                       | 0             |
//! | 2    | rows             | row length / row point  | 0             |
//! | 3    | slices           | traces in current slice | trace length  |

use qkit_format::{DatasetNode, ElementType};
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::{AppendOptions, Payload};

/// Name of the per-axis progress attribute.
pub const FILL_ATTR: &str = "fill";

fn read_fill(ds: &DatasetNode) -> [u64; 3] {
    let mut fill = [0u64; 3];
    if let Some(stored) = ds.attrs.get(FILL_ATTR).and_then(|v| v.as_i64_array()) {
        for (dst, &src) in fill.iter_mut().zip(stored) {
            *dst = src.max(0) as u64;
        }
    }
    fill
}

fn write_fill(ds: &mut DatasetNode, fill: [u64; 3]) {
    ds.attrs
        .set(FILL_ATTR, fill.iter().map(|&f| f as i64).collect::<Vec<i64>>());
}

fn mismatch(url: &str, reason: impl Into<String>) -> Error {
    Error::PayloadMismatch {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Apply one append to `ds`. `url` only labels errors and log events.
pub fn apply(ds: &mut DatasetNode, url: &str, payload: &Payload, opts: AppendOptions) -> Result<()> {
    let is_text = ds.element_type() == ElementType::Text;
    match (payload, is_text) {
        (Payload::Text(_), false) => return Err(mismatch(url, "text payload for a numeric dataset")),
        (Payload::Values(_), true) => return Err(mismatch(url, "numeric payload for a text dataset")),
        _ => {}
    }

    match (ds.rank(), payload) {
        (1, Payload::Text(text)) => append_text(ds, text),
        (1, Payload::Values(values)) => append_vector(ds, values, opts),
        (2, Payload::Values(values)) if opts.pointwise && values.len() == 1 => {
            append_point(ds, values[0], opts)
        }
        (2, Payload::Values(values)) => append_row(ds, url, values, opts),
        (3, Payload::Values(values)) => append_trace(ds, url, values, opts),
        (rank, _) => Err(mismatch(url, format!("cannot append to a rank {rank} dataset"))),
    }
}

fn append_text(ds: &mut DatasetNode, text: &str) -> Result<()> {
    let len = ds.shape[0];
    ds.resize(&[len + 1])?;
    ds.write_text(len as usize, &[text.to_string()])?;
    write_fill(ds, [len + 1, 0, 0]);
    Ok(())
}

fn append_vector(ds: &mut DatasetNode, values: &[f64], opts: AppendOptions) -> Result<()> {
    let len = ds.shape[0];
    let (start, new_len) = if values.len() > 1 && opts.reset {
        (0, values.len() as u64)
    } else {
        (len, len + values.len() as u64)
    };
    ds.resize(&[new_len])?;
    ds.write_f64(start as usize, values)?;
    write_fill(ds, [new_len, 0, 0]);
    Ok(())
}

/// Open the outer position for a box-like append and return
/// `(outer extent, fill)`. An empty dataset always starts at slice 1, so a
/// flagged first append does not leave an empty slice behind.
fn open_slice(ds: &DatasetNode, opts: AppendOptions) -> (u64, [u64; 3]) {
    let mut fill = read_fill(ds);
    let outer = ds.shape[0];
    let mut dim0 = outer.max(1);
    if outer == 0 {
        fill[0] = 1;
        fill[1] = 0;
    } else if opts.next_matrix {
        dim0 += 1;
        fill[0] = dim0;
        fill[1] = 0;
    } else {
        fill[0] = fill[0].clamp(1, outer);
    }
    (dim0, fill)
}

fn append_point(ds: &mut DatasetNode, value: f64, opts: AppendOptions) -> Result<()> {
    let (dim0, mut fill) = open_slice(ds, opts);
    if !(opts.reset && fill[1] > 0) {
        fill[1] += 1;
    }
    let dim1 = ds.shape[1].max(fill[1]);
    ds.resize(&[dim0, dim1])?;
    let index = (fill[0] - 1) * dim1 + (fill[1] - 1);
    ds.write_f64(index as usize, &[value])?;
    write_fill(ds, fill);
    Ok(())
}

fn append_row(ds: &mut DatasetNode, url: &str, values: &[f64], opts: AppendOptions) -> Result<()> {
    let (rows, width) = (ds.shape[0], ds.shape[1]);
    let len = values.len() as u64;
    if rows > 0 && width != len {
        warn!(url, old = width, new = len, "matrix row length changed");
    }
    let row = if opts.reset && rows > 0 {
        ds.resize(&[rows, len])?;
        rows - 1
    } else {
        ds.resize(&[rows + 1, len])?;
        rows
    };
    ds.write_f64((row * len) as usize, values)?;
    write_fill(ds, [ds.shape[0], len, 0]);
    Ok(())
}

fn append_trace(ds: &mut DatasetNode, url: &str, values: &[f64], opts: AppendOptions) -> Result<()> {
    let (dim0, mut fill) = open_slice(ds, opts);
    let len = values.len() as u64;
    if ds.shape[0] > 0 && ds.shape[2] != len {
        warn!(url, old = ds.shape[2], new = len, "box trace length changed");
    }
    let overwrite = opts.reset && fill[1] > 0;
    if !overwrite {
        fill[1] += 1;
    }
    let dim1 = ds.shape[1].max(fill[1]);
    ds.resize(&[dim0, dim1, len])?;
    let index = ((fill[0] - 1) * dim1 + (fill[1] - 1)) * len;
    ds.write_f64(index as usize, values)?;
    fill[2] = len;
    write_fill(ds, fill);
    Ok(())
}

/// Current `fill` counters of a dataset.
pub fn fill_of(ds: &DatasetNode) -> [u64; 3] {
    read_fill(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qkit_format::UNLIMITED;

    fn dataset(et: ElementType, rank: usize, trace: u64) -> DatasetNode {
        let shape = vec![0; rank];
        let max = vec![UNLIMITED; rank];
        let chunks: Vec<u64> = match rank {
            1 => vec![1024],
            2 => vec![5, trace],
            _ => vec![5, 5, trace],
        };
        let mut ds = DatasetNode::new(et, &shape, Some(&max), Some(&chunks));
        write_fill(&mut ds, [0, 0, 0]);
        ds
    }

    fn push(ds: &mut DatasetNode, payload: impl Into<Payload>, opts: AppendOptions) {
        apply(ds, "/t", &payload.into(), opts).unwrap();
    }

    const PLAIN: AppendOptions = AppendOptions {
        next_matrix: false,
        reset: false,
        pointwise: false,
    };
    const NEXT: AppendOptions = AppendOptions {
        next_matrix: true,
        reset: false,
        pointwise: false,
    };
    const RESET: AppendOptions = AppendOptions {
        next_matrix: false,
        reset: true,
        pointwise: false,
    };

    #[test]
    fn scalars_extend_a_vector() {
        let mut ds = dataset(ElementType::F64, 1, 1);
        for v in [1.0, 2.0, 3.0] {
            push(&mut ds, v, PLAIN);
        }
        assert_eq!(ds.to_f64().unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(fill_of(&ds), [3, 0, 0]);
    }

    #[test]
    fn reset_replaces_a_coordinate() {
        let mut ds = dataset(ElementType::F64, 1, 1);
        push(&mut ds, vec![1.0, 2.0, 3.0, 4.0], PLAIN);
        push(&mut ds, vec![7.0, 8.0], RESET);
        assert_eq!(ds.to_f64().unwrap(), vec![7.0, 8.0]);
        assert_eq!(fill_of(&ds), [2, 0, 0]);
        push(&mut ds, vec![9.0, 10.0], PLAIN);
        assert_eq!(ds.to_f64().unwrap(), vec![7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn text_lines_accumulate() {
        let mut ds = dataset(ElementType::Text, 1, 1);
        push(&mut ds, "first", PLAIN);
        push(&mut ds, "second", PLAIN);
        assert_eq!(ds.to_text().unwrap(), vec!["first", "second"]);
        assert_eq!(fill_of(&ds), [2, 0, 0]);
    }

    #[test]
    fn payload_kind_is_checked() {
        let mut text = dataset(ElementType::Text, 1, 1);
        let err = apply(&mut text, "/t", &Payload::from(1.0), PLAIN).unwrap_err();
        assert!(matches!(err, Error::PayloadMismatch { .. }));
        let mut matrix = dataset(ElementType::F32, 2, 3);
        let err = apply(&mut matrix, "/m", &Payload::from("row"), PLAIN).unwrap_err();
        assert!(matches!(err, Error::PayloadMismatch { url, .. } if url == "/m"));
    }

    #[test]
    fn rows_build_a_matrix() {
        let mut ds = dataset(ElementType::F32, 2, 3);
        push(&mut ds, vec![1.0, 2.0, 3.0], PLAIN);
        push(&mut ds, vec![4.0, 5.0, 6.0], PLAIN);
        assert_eq!(ds.shape, vec![2, 3]);
        assert_eq!(ds.to_f64().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(fill_of(&ds), [2, 3, 0]);
    }

    #[test]
    fn reset_overwrites_the_last_row() {
        let mut ds = dataset(ElementType::F32, 2, 2);
        push(&mut ds, vec![1.0, 2.0], PLAIN);
        push(&mut ds, vec![3.0, 4.0], PLAIN);
        push(&mut ds, vec![5.0, 6.0], RESET);
        assert_eq!(ds.shape, vec![2, 2]);
        assert_eq!(ds.to_f64().unwrap(), vec![1.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn reset_on_an_empty_matrix_appends() {
        let mut ds = dataset(ElementType::F32, 2, 2);
        push(&mut ds, vec![1.0, 2.0], RESET);
        assert_eq!(ds.shape, vec![1, 2]);
        assert_eq!(fill_of(&ds), [1, 2, 0]);
    }

    #[test]
    fn wider_row_resizes_the_matrix() {
        let mut ds = dataset(ElementType::F32, 2, 2);
        push(&mut ds, vec![1.0, 2.0], PLAIN);
        push(&mut ds, vec![3.0, 4.0, 5.0], PLAIN);
        assert_eq!(ds.shape, vec![2, 3]);
        let v = ds.to_f64().unwrap();
        assert_eq!(&v[..2], &[1.0, 2.0]);
        assert!(v[2].is_nan());
        assert_eq!(&v[3..], &[3.0, 4.0, 5.0]);
        assert_eq!(fill_of(&ds), [2, 3, 0]);
    }

    #[test]
    fn pointwise_matrix_fills_row_by_row() {
        let pointwise = AppendOptions {
            pointwise: true,
            ..PLAIN
        };
        let next = AppendOptions {
            pointwise: true,
            next_matrix: true,
            ..PLAIN
        };
        let mut ds = dataset(ElementType::F32, 2, 1);
        push(&mut ds, 1.0, next);
        push(&mut ds, 2.0, pointwise);
        push(&mut ds, 3.0, pointwise);
        push(&mut ds, 4.0, next);
        assert_eq!(ds.shape, vec![2, 3]);
        assert_eq!(fill_of(&ds), [2, 1, 0]);
        let v = ds.to_f64().unwrap();
        assert_eq!(&v[..4], &[1.0, 2.0, 3.0, 4.0]);
        assert!(v[4].is_nan() && v[5].is_nan());
    }

    #[test]
    fn pointwise_reset_overwrites_the_last_point() {
        let pointwise = AppendOptions {
            pointwise: true,
            ..PLAIN
        };
        let reset = AppendOptions {
            pointwise: true,
            reset: true,
            ..PLAIN
        };
        let mut ds = dataset(ElementType::F64, 2, 1);
        push(&mut ds, 1.0, pointwise);
        push(&mut ds, 2.0, pointwise);
        push(&mut ds, 5.0, reset);
        assert_eq!(ds.shape, vec![1, 2]);
        assert_eq!(ds.to_f64().unwrap(), vec![1.0, 5.0]);
    }

    #[test]
    fn box_grows_slice_by_slice() {
        let mut ds = dataset(ElementType::F32, 3, 2);
        push(&mut ds, vec![1.0, 2.0], PLAIN);
        push(&mut ds, vec![3.0, 4.0], PLAIN);
        assert_eq!(ds.shape, vec![1, 2, 2]);
        push(&mut ds, vec![5.0, 6.0], NEXT);
        assert_eq!(ds.shape, vec![2, 2, 2]);
        assert_eq!(fill_of(&ds), [2, 1, 2]);
        push(&mut ds, vec![7.0, 8.0], PLAIN);
        assert_eq!(ds.to_f64().unwrap(), (1..=8).map(f64::from).collect::<Vec<_>>());
        assert_eq!(fill_of(&ds), [2, 2, 2]);
    }

    #[test]
    fn flagged_first_append_opens_one_slice() {
        let mut ds = dataset(ElementType::F32, 3, 3);
        push(&mut ds, vec![1.0, 2.0, 3.0], NEXT);
        assert_eq!(ds.shape, vec![1, 1, 3]);
        assert_eq!(fill_of(&ds), [1, 1, 3]);
    }

    #[test]
    fn longer_later_slice_grows_middle_axis() {
        let mut ds = dataset(ElementType::F32, 3, 1);
        push(&mut ds, vec![1.0], NEXT);
        push(&mut ds, vec![2.0], NEXT);
        push(&mut ds, vec![3.0], PLAIN);
        assert_eq!(ds.shape, vec![2, 2, 1]);
        let v = ds.to_f64().unwrap();
        assert_eq!(v[0], 1.0);
        assert!(v[1].is_nan());
        assert_eq!(&v[2..], &[2.0, 3.0]);
    }

    #[test]
    fn box_reset_overwrites_current_trace() {
        let mut ds = dataset(ElementType::F32, 3, 2);
        push(&mut ds, vec![1.0, 2.0], PLAIN);
        push(&mut ds, vec![3.0, 4.0], RESET);
        assert_eq!(ds.shape, vec![1, 1, 2]);
        assert_eq!(ds.to_f64().unwrap(), vec![3.0, 4.0]);
        assert_eq!(fill_of(&ds), [1, 1, 2]);
    }

    #[test]
    fn rank_zero_is_rejected() {
        let mut ds = DatasetNode::scalar(ElementType::F32);
        assert!(apply(&mut ds, "/v", &Payload::from(1.0), PLAIN).is_err());
        assert!(ds.shape.is_empty());
    }
}
