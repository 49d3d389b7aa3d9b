//! HDF5 Attribute message (type 0x000C) and the typed values it carries.

use crate::cursor::Cursor;
use crate::data_read;
use crate::dataspace::{Dataspace, DataspaceType};
use crate::datatype::Datatype;
use crate::error::FormatError;

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    F64(f64),
    F64Array(Vec<f64>),
    I64(i64),
    I64Array(Vec<i64>),
    Bool(bool),
    String(String),
}

impl AttrValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::F64(v) => Some(*v),
            AttrValue::I64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::I64(v) => Some(*v),
            AttrValue::F64(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_i64_array(&self) -> Option<&[i64]> {
        match self {
            AttrValue::I64Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::F64(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::I64(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::String(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        AttrValue::F64Array(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::I64Array(v)
    }
}

/// Raw attribute message: name, type, shape and element bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMessage {
    pub name: String,
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub raw_data: Vec<u8>,
}

impl AttributeMessage {
    /// Build the message for a typed value.
    pub fn from_value(name: &str, value: &AttrValue) -> AttributeMessage {
        let (datatype, dataspace, raw_data) = match value {
            AttrValue::F64(v) => (Datatype::f64(), Dataspace::scalar(), v.to_le_bytes().to_vec()),
            AttrValue::F64Array(vs) => (
                Datatype::f64(),
                Dataspace::simple(&[vs.len() as u64], None),
                vs.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ),
            AttrValue::I64(v) => (Datatype::int(8), Dataspace::scalar(), v.to_le_bytes().to_vec()),
            AttrValue::I64Array(vs) => (
                Datatype::int(8),
                Dataspace::simple(&[vs.len() as u64], None),
                vs.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ),
            AttrValue::Bool(b) => (Datatype::boolean(), Dataspace::scalar(), vec![u8::from(*b)]),
            AttrValue::String(s) => {
                let width = s.len().max(1);
                let mut raw = s.as_bytes().to_vec();
                raw.resize(width, 0);
                (Datatype::utf8(width as u32), Dataspace::scalar(), raw)
            }
        };
        AttributeMessage {
            name: name.to_string(),
            datatype,
            dataspace,
            raw_data,
        }
    }

    /// Decode the element bytes into a typed value.
    ///
    /// Numbers decode to the scalar variants only for a scalar dataspace.
    pub fn value(&self) -> Result<AttrValue, FormatError> {
        let scalar = self.dataspace.space_type == DataspaceType::Scalar;
        let count = self.dataspace.num_elements() as usize;
        let dt = &self.datatype;
        if dt.is_boolean() {
            let flags = data_read::decode_bool(&self.raw_data, dt, count)?;
            return Ok(AttrValue::Bool(flags.first().copied().unwrap_or(false)));
        }
        match dt {
            Datatype::FloatingPoint { .. } => {
                let vs = data_read::decode_f64(&self.raw_data, dt, count)?;
                Ok(if scalar {
                    AttrValue::F64(vs.first().copied().unwrap_or(f64::NAN))
                } else {
                    AttrValue::F64Array(vs)
                })
            }
            Datatype::FixedPoint { .. } => {
                let vs = data_read::decode_i64(&self.raw_data, dt, count)?;
                Ok(if scalar {
                    AttrValue::I64(vs.first().copied().unwrap_or(0))
                } else {
                    AttrValue::I64Array(vs)
                })
            }
            Datatype::String { .. } => {
                let mut vs = data_read::decode_strings(&self.raw_data, dt, count.max(1))?;
                Ok(AttrValue::String(vs.swap_remove(0)))
            }
            Datatype::Enum { .. } => Err(FormatError::UnsupportedDatatype(
                "enumeration other than FALSE/TRUE".into(),
            )),
        }
    }

    /// Parse an attribute message (versions 1, 2 and 3).
    pub fn parse(data: &[u8], length_size: u8) -> Result<AttributeMessage, FormatError> {
        let mut c = Cursor::new(data);
        let version = c.u8()?;
        if !(1..=3).contains(&version) {
            return Err(FormatError::InvalidAttributeVersion(version));
        }
        c.skip(1)?; // reserved (v1) or flags (v2, v3)
        let name_size = c.u16()? as usize;
        let datatype_size = c.u16()? as usize;
        let dataspace_size = c.u16()? as usize;
        if version == 3 {
            c.skip(1)?; // name character set
        }
        let padded = |n: usize| if version == 1 { n.div_ceil(8) * 8 } else { n };

        let name_raw = c.bytes(padded(name_size))?;
        let name_end = name_raw.iter().position(|&b| b == 0).unwrap_or(name_size);
        let name = String::from_utf8_lossy(&name_raw[..name_end]).into_owned();

        let dt_raw = c.bytes(padded(datatype_size))?;
        let (datatype, _) = Datatype::parse(dt_raw)?;
        let ds_raw = c.bytes(padded(dataspace_size))?;
        let dataspace = Dataspace::parse(ds_raw, length_size)?;

        let data_len = dataspace.num_elements() as usize * datatype.type_size() as usize;
        let raw_data = c.bytes(data_len)?.to_vec();

        Ok(AttributeMessage {
            name,
            datatype,
            dataspace,
            raw_data,
        })
    }

    /// Serialize as a version 2 message (no padding between fields).
    pub fn serialize(&self, length_size: u8) -> Vec<u8> {
        let dt = self.datatype.serialize();
        let ds = self.dataspace.serialize(length_size);
        let name_len = self.name.len() + 1;

        let mut buf = Vec::with_capacity(8 + name_len + dt.len() + ds.len() + self.raw_data.len());
        buf.push(2);
        buf.push(0);
        buf.extend_from_slice(&(name_len as u16).to_le_bytes());
        buf.extend_from_slice(&(dt.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(ds.len() as u16).to_le_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&dt);
        buf.extend_from_slice(&ds);
        buf.extend_from_slice(&self.raw_data);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn through_bytes(name: &str, value: AttrValue) -> AttributeMessage {
        let msg = AttributeMessage::from_value(name, &value);
        let parsed = AttributeMessage::parse(&msg.serialize(8), 8).unwrap();
        assert_eq!(parsed.name, name);
        assert_eq!(parsed.value().unwrap(), value);
        parsed
    }

    #[test]
    fn string_attribute() {
        let msg = through_bytes("NX_class", "NXentry".into());
        assert_eq!(msg.datatype.type_size(), 7);
    }

    #[test]
    fn empty_string_keeps_one_byte() {
        let msg = through_bytes("comment", "".into());
        assert_eq!(msg.raw_data, vec![0]);
    }

    #[test]
    fn fill_counter_array() {
        through_bytes("fill", AttrValue::I64Array(vec![3, 0, 12]));
    }

    #[test]
    fn scalar_numbers_and_flags() {
        through_bytes("ds_type", AttrValue::I64(2));
        through_bytes("_unix_timestamp", AttrValue::F64(1.5e9));
        through_bytes("updating", AttrValue::Bool(true));
        through_bytes("mixed", AttrValue::F64Array(vec![0.5, f64::INFINITY]));
    }

    #[test]
    fn unicode_string() {
        through_bytes("unit", "µV".into());
    }

    #[test]
    fn version_one_padding() {
        // name "ab\0" padded to 8, f64 datatype (20 bytes) padded to 24,
        // scalar v1 dataspace (8 bytes)
        let dt = Datatype::f64().serialize();
        let mut raw = vec![1, 0];
        raw.extend_from_slice(&3u16.to_le_bytes());
        raw.extend_from_slice(&(dt.len() as u16).to_le_bytes());
        raw.extend_from_slice(&8u16.to_le_bytes());
        raw.extend_from_slice(b"ab\0\0\0\0\0\0");
        raw.extend_from_slice(&dt);
        raw.resize(raw.len() + (24 - dt.len()), 0);
        raw.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
        raw.extend_from_slice(&2.25f64.to_le_bytes());
        let msg = AttributeMessage::parse(&raw, 8).unwrap();
        assert_eq!(msg.name, "ab");
        assert_eq!(msg.value().unwrap(), AttrValue::F64(2.25));
    }

    #[test]
    fn integer_reads_as_float() {
        assert_eq!(AttrValue::I64(4).as_f64(), Some(4.0));
        assert_eq!(AttrValue::F64(4.5).as_i64(), None);
    }
}
