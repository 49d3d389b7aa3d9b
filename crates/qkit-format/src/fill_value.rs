//! Fill Value message (type 0x0005).

use crate::cursor::Cursor;
use crate::error::FormatError;

/// Space allocation time stored in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocTime {
    Early,
    Late,
    Incremental,
}

impl AllocTime {
    fn bits(self) -> u8 {
        match self {
            AllocTime::Early => 1,
            AllocTime::Late => 2,
            AllocTime::Incremental => 3,
        }
    }
}

/// Serialize a version 3 message. Fill is written "if set".
pub fn serialize(alloc: AllocTime, value: Option<&[u8]>) -> Vec<u8> {
    let mut flags = alloc.bits() | (2 << 2);
    if value.is_some() {
        flags |= 0x20;
    }
    let mut buf = vec![3, flags];
    if let Some(v) = value {
        buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
        buf.extend_from_slice(v);
    }
    buf
}

/// The user-defined fill bytes, if any. Versions 1 to 3 are read.
pub fn parse(data: &[u8]) -> Result<Option<Vec<u8>>, FormatError> {
    let mut c = Cursor::new(data);
    let version = c.u8()?;
    let defined = match version {
        1 | 2 => {
            c.skip(2)?; // allocation and write time
            let defined = c.u8()? != 0;
            if version == 1 || defined {
                let size = c.u32()? as usize;
                let bytes = c.bytes(size)?;
                return Ok(defined.then(|| bytes.to_vec()).filter(|b| !b.is_empty()));
            }
            false
        }
        3 => c.u8()? & 0x20 != 0,
        other => return Err(FormatError::UnsupportedVersion(other)),
    };
    if !defined {
        return Ok(None);
    }
    let size = c.u32()? as usize;
    Ok(Some(c.bytes(size)?.to_vec()))
}
