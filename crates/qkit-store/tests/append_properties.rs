//! Property-based tests for the append engine.
//!
//! Shapes and fill markers must track the number of appends for every
//! dataset kind, whatever the payload values are.

use proptest::prelude::*;
use qkit_store::{AttrValue, Dataset, DsType, Folder, H5File, OpenMode};

use std::path::PathBuf;

fn scratch() -> (tempfile::TempDir, H5File) {
    let dir = tempfile::tempdir().unwrap();
    let file = H5File::open(dir.path().join("p.h5"), OpenMode::Create, false).unwrap();
    (dir, file)
}

/// Values that survive the 32-bit storage unchanged.
fn arb_value() -> impl Strategy<Value = f64> {
    (-1000i32..1000).prop_map(|v| f64::from(v) / 4.0)
}

fn fill(file: &H5File, url: &str) -> Vec<i64> {
    file.attr(url, "fill")
        .unwrap()
        .and_then(|v| v.as_i64_array().map(<[i64]>::to_vec))
        .unwrap()
}

fn scratch_path() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.h5");
    (dir, path)
}

fn bits(values: &[f64]) -> Vec<u64> {
    values.iter().map(|v| v.to_bits()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    // Row counts on both sides of 320 rows (64 chunks of 5 rows, one full
    // B-tree leaf).
    #[test]
    fn reopened_matrix_is_bit_identical(
        rows in 300usize..420,
        len in 1usize..4,
        seed in arb_value(),
    ) {
        let (_dir, path) = scratch_path();
        let mut file = H5File::open(&path, OpenMode::Create, false).unwrap();
        let mut ds = Dataset::new("m", DsType::Matrix, Folder::Data);
        for r in 0..rows {
            let row: Vec<f64> = (0..len).map(|i| seed + (r * len + i) as f64 / 4.0).collect();
            ds.append(&mut file, row, false, false).unwrap();
        }
        let written = file.read_f64(ds.url()).unwrap();
        file.close().unwrap();

        let file = H5File::open(&path, OpenMode::Read, false).unwrap();
        prop_assert_eq!(file.shape(ds.url()).unwrap(), vec![rows as u64, len as u64]);
        prop_assert_eq!(bits(&file.read_f64(ds.url()).unwrap()), bits(&written));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn scalars_grow_a_vector(values in prop::collection::vec(arb_value(), 1..40)) {
        let (_dir, mut file) = scratch();
        let mut ds = Dataset::new("v", DsType::Vector, Folder::Data);
        for &v in &values {
            ds.append(&mut file, v, false, false).unwrap();
        }
        prop_assert_eq!(file.shape(ds.url()).unwrap(), vec![values.len() as u64]);
        prop_assert_eq!(fill(&file, ds.url())[0], values.len() as i64);
        prop_assert_eq!(file.read_f64(ds.url()).unwrap(), values);
    }

    #[test]
    fn rows_grow_a_matrix(rows in 1usize..12, len in 1usize..20, seed in arb_value()) {
        let (_dir, mut file) = scratch();
        let mut ds = Dataset::new("m", DsType::Matrix, Folder::Data);
        for r in 0..rows {
            let row: Vec<f64> = (0..len).map(|i| seed + (r * len + i) as f64).collect();
            ds.append(&mut file, row, false, false).unwrap();
        }
        prop_assert_eq!(file.shape(ds.url()).unwrap(), vec![rows as u64, len as u64]);
        prop_assert_eq!(fill(&file, ds.url()), vec![rows as i64, len as i64, 0]);
        let stored = file.read_f64(ds.url()).unwrap();
        prop_assert_eq!(stored.len(), rows * len);
        let last = (rows - 1) * len;
        prop_assert_eq!(stored[last], seed + last as f64);
    }

    #[test]
    fn flagged_appends_count_box_slices(
        slices in 1usize..5,
        traces in 1usize..5,
        len in 1usize..8,
    ) {
        let (_dir, mut file) = scratch();
        let mut ds = Dataset::new("b", DsType::Box, Folder::Data);
        for _ in 0..slices {
            ds.next_matrix();
            for t in 0..traces {
                ds.append(&mut file, vec![t as f64; len], false, false).unwrap();
            }
        }
        prop_assert_eq!(
            file.shape(ds.url()).unwrap(),
            vec![slices as u64, traces as u64, len as u64]
        );
        prop_assert_eq!(
            file.attr(ds.url(), "fill").unwrap(),
            Some(AttrValue::from(vec![slices as i64, traces as i64, len as i64]))
        );
    }

    #[test]
    fn pointwise_appends_fill_rows_in_order(cols in 1usize..10, rows in 1usize..5) {
        let (_dir, mut file) = scratch();
        let mut ds = Dataset::new("p", DsType::Matrix, Folder::Data);
        for r in 0..rows {
            ds.next_matrix();
            for c in 0..cols {
                ds.append(&mut file, (r * cols + c) as f64, false, true).unwrap();
            }
        }
        prop_assert_eq!(file.shape(ds.url()).unwrap(), vec![rows as u64, cols as u64]);
        let expected: Vec<f64> = (0..rows * cols).map(|i| i as f64).collect();
        prop_assert_eq!(file.read_f64(ds.url()).unwrap(), expected);
    }
}
