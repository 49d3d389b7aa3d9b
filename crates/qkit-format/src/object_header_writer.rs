//! Object header writer for the v2 format.

use crate::checksum::jenkins_lookup3;
use crate::error::FormatError;
use crate::message_type::MessageType;

/// Message flag: the message content is constant.
pub const MSG_CONSTANT: u8 = 0x01;

/// Collects header messages and emits a single-chunk v2 object header.
#[derive(Debug, Default)]
pub struct ObjectHeaderWriter {
    messages: Vec<(MessageType, Vec<u8>, u8)>,
}

impl ObjectHeaderWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message with default flags (0).
    pub fn add_message(&mut self, msg_type: MessageType, data: Vec<u8>) {
        self.messages.push((msg_type, data, 0));
    }

    /// Add a message with explicit message flags.
    pub fn add_message_with_flags(&mut self, msg_type: MessageType, data: Vec<u8>, flags: u8) {
        self.messages.push((msg_type, data, flags));
    }

    /// Serialize: "OHDR", version, flags, chunk0 size, messages, checksum.
    ///
    /// The chunk0 size field is as narrow as the message bytes allow.
    pub fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        let body_len: usize = self.messages.iter().map(|(_, d, _)| 4 + d.len()).sum();
        let (flags, width) = match body_len {
            0..=0xFF => (0x00u8, 1usize),
            0x100..=0xFFFF => (0x01, 2),
            _ => (0x02, 4),
        };

        let mut buf = Vec::with_capacity(6 + width + body_len + 4);
        buf.extend_from_slice(b"OHDR");
        buf.push(2);
        buf.push(flags);
        buf.extend_from_slice(&(body_len as u32).to_le_bytes()[..width]);

        for (msg_type, data, msg_flags) in &self.messages {
            let size = u16::try_from(data.len()).map_err(|_| FormatError::MessageTooLarge(data.len()))?;
            buf.push(msg_type.to_u16() as u8);
            buf.extend_from_slice(&size.to_le_bytes());
            buf.push(*msg_flags);
            buf.extend_from_slice(data);
        }

        let checksum = jenkins_lookup3(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_header::ObjectHeader;

    #[test]
    fn empty_header_parses() {
        let bytes = ObjectHeaderWriter::new().serialize().unwrap();
        let hdr = ObjectHeader::parse(&bytes, 0, 8, 8).unwrap();
        assert!(hdr.messages.is_empty());
    }

    #[test]
    fn messages_keep_order_and_flags() {
        let mut w = ObjectHeaderWriter::new();
        w.add_message_with_flags(MessageType::Datatype, vec![9, 9], MSG_CONSTANT);
        w.add_message(MessageType::Dataspace, vec![1, 2, 3]);
        let bytes = w.serialize().unwrap();
        let hdr = ObjectHeader::parse(&bytes, 0, 8, 8).unwrap();
        assert_eq!(hdr.messages.len(), 2);
        assert_eq!(hdr.messages[0].msg_type, MessageType::Datatype);
        assert_eq!(hdr.messages[0].flags, MSG_CONSTANT);
        assert_eq!(hdr.require(MessageType::Dataspace).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn wide_chunk_size_field() {
        let mut w = ObjectHeaderWriter::new();
        for _ in 0..300 {
            w.add_message(MessageType::Attribute, vec![0xAB; 250]);
        }
        let bytes = w.serialize().unwrap();
        // 300 * 254 bytes needs the 4-byte size field
        assert_eq!(bytes[5] & 0x03, 0x02);
        let hdr = ObjectHeader::parse(&bytes, 0, 8, 8).unwrap();
        assert_eq!(hdr.all(MessageType::Attribute).count(), 300);
    }

    #[test]
    fn oversized_message_rejected() {
        let mut w = ObjectHeaderWriter::new();
        w.add_message(MessageType::Attribute, vec![0; 70_000]);
        assert_eq!(w.serialize(), Err(FormatError::MessageTooLarge(70_000)));
    }

    #[test]
    fn tampered_header_fails_checksum() {
        let mut w = ObjectHeaderWriter::new();
        w.add_message(MessageType::Dataspace, vec![1, 2, 3]);
        let mut bytes = w.serialize().unwrap();
        bytes[10] ^= 0xFF;
        assert!(matches!(
            ObjectHeader::parse(&bytes, 0, 8, 8),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn missing_message_is_reported() {
        let bytes = ObjectHeaderWriter::new().serialize().unwrap();
        let hdr = ObjectHeader::parse(&bytes, 0, 8, 8).unwrap();
        assert_eq!(
            hdr.require(MessageType::DataLayout),
            Err(FormatError::MissingMessage(MessageType::DataLayout))
        );
    }
}
