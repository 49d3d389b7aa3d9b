//! Decoding raw element bytes into Rust values.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::datatype::{Datatype, DatatypeByteOrder, StringPadding};
use crate::error::FormatError;

fn check_len(raw: &[u8], count: usize, size: usize) -> Result<(), FormatError> {
    let needed = count * size;
    if raw.len() < needed {
        return Err(FormatError::UnexpectedEof {
            expected: needed,
            available: raw.len(),
        });
    }
    Ok(())
}

fn read_float<B: ByteOrder>(raw: &[u8], size: usize, count: usize) -> Vec<f64> {
    raw.chunks_exact(size)
        .take(count)
        .map(|b| match size {
            4 => f64::from(B::read_f32(b)),
            _ => B::read_f64(b),
        })
        .collect()
}

fn read_int<B: ByteOrder>(raw: &[u8], size: usize, signed: bool, count: usize) -> Vec<i64> {
    raw.chunks_exact(size)
        .take(count)
        .map(|b| {
            if signed {
                B::read_int(b, size)
            } else {
                B::read_uint(b, size) as i64
            }
        })
        .collect()
}

/// Decode `count` numeric elements as `f64`.
pub fn decode_f64(raw: &[u8], dtype: &Datatype, count: usize) -> Result<Vec<f64>, FormatError> {
    match dtype {
        Datatype::FloatingPoint {
            size, byte_order, ..
        } => {
            let size = *size as usize;
            if size != 4 && size != 8 {
                return Err(FormatError::UnsupportedDatatype(format!(
                    "{size}-byte float"
                )));
            }
            check_len(raw, count, size)?;
            Ok(match byte_order {
                DatatypeByteOrder::LittleEndian => read_float::<LittleEndian>(raw, size, count),
                DatatypeByteOrder::BigEndian => read_float::<BigEndian>(raw, size, count),
            })
        }
        Datatype::FixedPoint { .. } | Datatype::Enum { .. } => {
            Ok(decode_i64(raw, dtype, count)?.into_iter().map(|v| v as f64).collect())
        }
        Datatype::String { .. } => Err(FormatError::TypeMismatch {
            expected: "string",
            actual: "float",
        }),
    }
}

/// Decode `count` integer elements as `i64`.
pub fn decode_i64(raw: &[u8], dtype: &Datatype, count: usize) -> Result<Vec<i64>, FormatError> {
    match dtype {
        Datatype::FixedPoint {
            size,
            byte_order,
            signed,
            ..
        } => {
            let size = *size as usize;
            if !(1..=8).contains(&size) {
                return Err(FormatError::UnsupportedDatatype(format!(
                    "{size}-byte integer"
                )));
            }
            check_len(raw, count, size)?;
            Ok(match byte_order {
                DatatypeByteOrder::LittleEndian => read_int::<LittleEndian>(raw, size, *signed, count),
                DatatypeByteOrder::BigEndian => read_int::<BigEndian>(raw, size, *signed, count),
            })
        }
        Datatype::Enum { base, .. } => decode_i64(raw, base, count),
        Datatype::FloatingPoint { .. } => Err(FormatError::TypeMismatch {
            expected: "float",
            actual: "integer",
        }),
        Datatype::String { .. } => Err(FormatError::TypeMismatch {
            expected: "string",
            actual: "integer",
        }),
    }
}

/// Decode `count` boolean elements (nonzero = true).
pub fn decode_bool(raw: &[u8], dtype: &Datatype, count: usize) -> Result<Vec<bool>, FormatError> {
    Ok(decode_i64(raw, dtype, count)?.into_iter().map(|v| v != 0).collect())
}

/// Decode `count` fixed-length strings, stripping their padding.
pub fn decode_strings(raw: &[u8], dtype: &Datatype, count: usize) -> Result<Vec<String>, FormatError> {
    let (size, padding) = match dtype {
        Datatype::String { size, padding, .. } => (*size as usize, *padding),
        _ => {
            return Err(FormatError::TypeMismatch {
                expected: "numeric",
                actual: "string",
            })
        }
    };
    if size == 0 {
        return Ok(vec![String::new(); count]);
    }
    check_len(raw, count, size)?;
    Ok(raw
        .chunks_exact(size)
        .take(count)
        .map(|b| {
            let text = match padding {
                StringPadding::SpacePad => {
                    let end = b.iter().rposition(|&c| c != b' ').map_or(0, |p| p + 1);
                    &b[..end]
                }
                StringPadding::NullTerminate | StringPadding::NullPad => {
                    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
                    &b[..end]
                }
            };
            String::from_utf8_lossy(text).into_owned()
        })
        .collect())
}
