//! HDF5 Datatype message (type 0x0003).
//!
//! Only the classes the store needs are modelled: fixed-point integers,
//! IEEE floats, fixed-length strings and enumerations (for booleans).

use crate::cursor::Cursor;
use crate::error::FormatError;

/// Byte order of numeric types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatatypeByteOrder {
    LittleEndian,
    BigEndian,
}

/// Padding of fixed-length strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

/// Character set of strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSet {
    Ascii,
    Utf8,
}

/// One named value of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    /// Raw value bytes, `base.type_size()` long.
    pub value: Vec<u8>,
}

/// Parsed datatype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    /// Class 0: integer.
    FixedPoint {
        size: u32,
        byte_order: DatatypeByteOrder,
        signed: bool,
        bit_offset: u16,
        bit_precision: u16,
    },
    /// Class 1: IEEE floating point.
    FloatingPoint {
        size: u32,
        byte_order: DatatypeByteOrder,
        bit_offset: u16,
        bit_precision: u16,
        exponent_location: u8,
        exponent_size: u8,
        mantissa_location: u8,
        mantissa_size: u8,
        exponent_bias: u32,
    },
    /// Class 3: fixed-length string.
    String {
        size: u32,
        padding: StringPadding,
        charset: CharacterSet,
    },
    /// Class 8: enumeration over an integer base type.
    Enum {
        base: Box<Datatype>,
        members: Vec<EnumMember>,
    },
}

impl Datatype {
    /// Little-endian IEEE binary32.
    pub fn f32() -> Self {
        Datatype::FloatingPoint {
            size: 4,
            byte_order: DatatypeByteOrder::LittleEndian,
            bit_offset: 0,
            bit_precision: 32,
            exponent_location: 23,
            exponent_size: 8,
            mantissa_location: 0,
            mantissa_size: 23,
            exponent_bias: 127,
        }
    }

    /// Little-endian IEEE binary64.
    pub fn f64() -> Self {
        Datatype::FloatingPoint {
            size: 8,
            byte_order: DatatypeByteOrder::LittleEndian,
            bit_offset: 0,
            bit_precision: 64,
            exponent_location: 52,
            exponent_size: 11,
            mantissa_location: 0,
            mantissa_size: 52,
            exponent_bias: 1023,
        }
    }

    /// Little-endian signed integer of `size` bytes.
    pub fn int(size: u32) -> Self {
        Datatype::FixedPoint {
            size,
            byte_order: DatatypeByteOrder::LittleEndian,
            signed: true,
            bit_offset: 0,
            bit_precision: (size * 8) as u16,
        }
    }

    /// Null-padded UTF-8 string of `size` bytes.
    pub fn utf8(size: u32) -> Self {
        Datatype::String {
            size,
            padding: StringPadding::NullPad,
            charset: CharacterSet::Utf8,
        }
    }

    /// The FALSE/TRUE enumeration h5py uses for numpy booleans.
    pub fn boolean() -> Self {
        Datatype::Enum {
            base: Box::new(Datatype::int(1)),
            members: vec![
                EnumMember {
                    name: "FALSE".into(),
                    value: vec![0],
                },
                EnumMember {
                    name: "TRUE".into(),
                    value: vec![1],
                },
            ],
        }
    }

    /// True for the two-member FALSE/TRUE enumeration.
    pub fn is_boolean(&self) -> bool {
        match self {
            Datatype::Enum { base, members } => {
                base.type_size() == 1
                    && members.len() == 2
                    && members.iter().any(|m| m.name == "FALSE")
                    && members.iter().any(|m| m.name == "TRUE")
            }
            _ => false,
        }
    }

    /// Size in bytes of one element.
    pub fn type_size(&self) -> u32 {
        match self {
            Datatype::FixedPoint { size, .. }
            | Datatype::FloatingPoint { size, .. }
            | Datatype::String { size, .. } => *size,
            Datatype::Enum { base, .. } => base.type_size(),
        }
    }

    /// Parse a datatype; returns it with the number of bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        let mut c = Cursor::new(data);
        let dt = Self::parse_from(&mut c)?;
        Ok((dt, c.position()))
    }

    fn parse_from(c: &mut Cursor<'_>) -> Result<Datatype, FormatError> {
        let class_version = c.u8()?;
        let class = class_version & 0x0F;
        let version = class_version >> 4;
        let bf = [c.u8()?, c.u8()?, c.u8()?];
        let size = c.u32()?;
        let byte_order = if bf[0] & 0x01 == 0 {
            DatatypeByteOrder::LittleEndian
        } else {
            DatatypeByteOrder::BigEndian
        };

        match class {
            0 => Ok(Datatype::FixedPoint {
                size,
                byte_order,
                signed: bf[0] & 0x08 != 0,
                bit_offset: c.u16()?,
                bit_precision: c.u16()?,
            }),
            1 => {
                if bf[0] & 0x40 != 0 {
                    return Err(FormatError::UnsupportedDatatype("VAX float".into()));
                }
                Ok(Datatype::FloatingPoint {
                    size,
                    byte_order,
                    bit_offset: c.u16()?,
                    bit_precision: c.u16()?,
                    exponent_location: c.u8()?,
                    exponent_size: c.u8()?,
                    mantissa_location: c.u8()?,
                    mantissa_size: c.u8()?,
                    exponent_bias: c.u32()?,
                })
            }
            3 => Ok(Datatype::String {
                size,
                padding: match bf[0] & 0x0F {
                    0 => StringPadding::NullTerminate,
                    1 => StringPadding::NullPad,
                    2 => StringPadding::SpacePad,
                    other => return Err(FormatError::InvalidStringPadding(other)),
                },
                charset: match bf[0] >> 4 {
                    0 => CharacterSet::Ascii,
                    1 => CharacterSet::Utf8,
                    other => return Err(FormatError::InvalidCharset(other)),
                },
            }),
            8 => {
                let count = u16::from_le_bytes([bf[0], bf[1]]) as usize;
                let base = Self::parse_from(c)?;
                let mut names = Vec::with_capacity(count);
                for _ in 0..count {
                    names.push(read_enum_name(c, version < 3)?);
                }
                let width = base.type_size() as usize;
                let mut members = Vec::with_capacity(count);
                for name in names {
                    members.push(EnumMember {
                        name,
                        value: c.bytes(width)?.to_vec(),
                    });
                }
                Ok(Datatype::Enum {
                    base: Box::new(base),
                    members,
                })
            }
            9 => Err(FormatError::UnsupportedDatatype(
                "variable-length data".into(),
            )),
            other => Err(FormatError::InvalidDatatypeClass(other)),
        }
    }

    /// Serialize the datatype message.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Datatype::FixedPoint {
                size,
                byte_order,
                signed,
                bit_offset,
                bit_precision,
            } => {
                let mut bf0 = order_bit(*byte_order);
                if *signed {
                    bf0 |= 0x08;
                }
                let mut buf = header(0, 1, [bf0, 0, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&bit_precision.to_le_bytes());
                buf
            }
            Datatype::FloatingPoint {
                size,
                byte_order,
                bit_offset,
                bit_precision,
                exponent_location,
                exponent_size,
                mantissa_location,
                mantissa_size,
                exponent_bias,
            } => {
                // bits 4-5 = 2: implied leading mantissa bit; bf1 = sign bit position
                let bf0 = 0x20 | order_bit(*byte_order);
                let sign_location = bit_precision.saturating_sub(1) as u8;
                let mut buf = header(1, 1, [bf0, sign_location, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&bit_precision.to_le_bytes());
                buf.extend_from_slice(&[
                    *exponent_location,
                    *exponent_size,
                    *mantissa_location,
                    *mantissa_size,
                ]);
                buf.extend_from_slice(&exponent_bias.to_le_bytes());
                buf
            }
            Datatype::String {
                size,
                padding,
                charset,
            } => {
                let pad = match padding {
                    StringPadding::NullTerminate => 0,
                    StringPadding::NullPad => 1,
                    StringPadding::SpacePad => 2,
                };
                let cs = match charset {
                    CharacterSet::Ascii => 0,
                    CharacterSet::Utf8 => 1,
                };
                header(3, 1, [pad | (cs << 4), 0, 0], *size)
            }
            Datatype::Enum { base, members } => {
                let count = (members.len() as u16).to_le_bytes();
                let mut buf = header(8, 1, [count[0], count[1], 0], base.type_size());
                buf.extend_from_slice(&base.serialize());
                // version 1: names null-terminated and padded to 8 bytes
                for m in members {
                    let start = buf.len();
                    buf.extend_from_slice(m.name.as_bytes());
                    buf.push(0);
                    let padded = (buf.len() - start).div_ceil(8) * 8;
                    buf.resize(start + padded, 0);
                }
                for m in members {
                    buf.extend_from_slice(&m.value);
                }
                buf
            }
        }
    }
}

fn order_bit(order: DatatypeByteOrder) -> u8 {
    match order {
        DatatypeByteOrder::LittleEndian => 0,
        DatatypeByteOrder::BigEndian => 1,
    }
}

fn header(class: u8, version: u8, bf: [u8; 3], size: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    buf.push((class & 0x0F) | (version << 4));
    buf.extend_from_slice(&bf);
    buf.extend_from_slice(&size.to_le_bytes());
    buf
}

fn read_enum_name(c: &mut Cursor<'_>, padded: bool) -> Result<String, FormatError> {
    let start = c.position();
    let mut name = Vec::new();
    loop {
        let b = c.u8()?;
        if b == 0 {
            break;
        }
        name.push(b);
    }
    if padded {
        let used = c.position() - start;
        c.skip(used.div_ceil(8) * 8 - used)?;
    }
    Ok(String::from_utf8_lossy(&name).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(dt: &Datatype) -> Datatype {
        let bytes = dt.serialize();
        let (parsed, used) = Datatype::parse(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        parsed
    }

    #[test]
    fn f64_matches_native_double_header() {
        let bytes = Datatype::f64().serialize();
        assert_eq!(&bytes[..8], &[0x11, 0x20, 0x3f, 0x00, 8, 0, 0, 0]);
        assert_eq!(roundtrip(&Datatype::f64()), Datatype::f64());
    }

    #[test]
    fn f32_sign_bit_position() {
        let bytes = Datatype::f32().serialize();
        assert_eq!(bytes[2], 31);
        assert_eq!(roundtrip(&Datatype::f32()).type_size(), 4);
    }

    #[test]
    fn signed_integer() {
        let dt = Datatype::int(8);
        assert_eq!(dt.serialize()[1], 0x08);
        assert_eq!(roundtrip(&dt), dt);
    }

    #[test]
    fn utf8_string() {
        let dt = Datatype::utf8(17);
        assert_eq!(roundtrip(&dt), dt);
    }

    #[test]
    fn boolean_enum() {
        let dt = roundtrip(&Datatype::boolean());
        assert!(dt.is_boolean());
        assert_eq!(dt.type_size(), 1);
    }

    #[test]
    fn variable_length_is_rejected() {
        let raw = [0x19, 0x01, 0x00, 0x00, 16, 0, 0, 0];
        assert!(matches!(
            Datatype::parse(&raw),
            Err(FormatError::UnsupportedDatatype(_))
        ));
    }

    #[test]
    fn unknown_class() {
        let raw = [0x1E, 0, 0, 0, 1, 0, 0, 0];
        assert_eq!(
            Datatype::parse(&raw),
            Err(FormatError::InvalidDatatypeClass(14))
        );
    }
}
