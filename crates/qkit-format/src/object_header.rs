//! Version 2 object headers ("OHDR"), including continuation chunks.

use crate::checksum::jenkins_lookup3;
use crate::cursor::Cursor;
use crate::error::FormatError;
use crate::message_type::MessageType;

const OHDR_SIGNATURE: &[u8; 4] = b"OHDR";
const OCHK_SIGNATURE: &[u8; 4] = b"OCHK";

const FLAG_CREATION_ORDER: u8 = 0x04;
const FLAG_PHASE_CHANGE: u8 = 0x10;
const FLAG_TIMES: u8 = 0x20;

/// Message flag bit 3: fail if the message type is unknown.
const MSG_FAIL_IF_UNKNOWN: u8 = 0x08;

/// A single parsed header message.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMessage {
    /// The message type.
    pub msg_type: MessageType,
    /// Message flags byte.
    pub flags: u8,
    /// Raw message payload.
    pub data: Vec<u8>,
}

/// Parsed v2 object header.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHeader {
    /// Header flags byte.
    pub flags: u8,
    /// All non-NIL messages across chunk 0 and continuation chunks.
    pub messages: Vec<HeaderMessage>,
}

impl ObjectHeader {
    /// Parse the object header at `offset`.
    pub fn parse(data: &[u8], offset: usize, offset_size: u8, length_size: u8) -> Result<ObjectHeader, FormatError> {
        let mut c = Cursor::at(data, offset);
        if c.bytes(4)? != OHDR_SIGNATURE {
            return Err(FormatError::InvalidObjectHeaderSignature);
        }
        let version = c.u8()?;
        if version != 2 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        let flags = c.u8()?;
        if flags & FLAG_TIMES != 0 {
            c.skip(16)?;
        }
        if flags & FLAG_PHASE_CHANGE != 0 {
            c.skip(4)?;
        }
        let chunk0_size = c.uint(1 << (flags & 0x03))? as usize;
        let body_start = c.position();
        c.skip(chunk0_size)?;
        verify_checksum(data, offset, body_start + chunk0_size)?;

        let creation_order = flags & FLAG_CREATION_ORDER != 0;
        let mut messages = Vec::new();
        let mut pending = Vec::new();
        read_messages(
            &data[body_start..body_start + chunk0_size],
            creation_order,
            &mut messages,
            &mut pending,
        )?;

        while let Some(cont) = pending.pop() {
            let mut cc = Cursor::new(&cont);
            let addr = cc.uint(offset_size)? as usize;
            let len = cc.uint(length_size)? as usize;
            let mut chunk = Cursor::at(data, addr);
            if chunk.bytes(4)? != OCHK_SIGNATURE {
                return Err(FormatError::InvalidObjectHeaderSignature);
            }
            // `len` covers the signature and the trailing checksum.
            let body_len = len.checked_sub(8).ok_or(FormatError::UnexpectedEof {
                expected: 8,
                available: len,
            })?;
            let body = chunk.bytes(body_len)?;
            verify_checksum(data, addr, addr + 4 + body_len)?;
            read_messages(body, creation_order, &mut messages, &mut pending)?;
        }

        Ok(ObjectHeader { flags, messages })
    }

    /// First message of the given type.
    pub fn find(&self, msg_type: MessageType) -> Option<&HeaderMessage> {
        self.messages.iter().find(|m| m.msg_type == msg_type)
    }

    /// All messages of the given type, in header order.
    pub fn all(&self, msg_type: MessageType) -> impl Iterator<Item = &HeaderMessage> {
        self.messages.iter().filter(move |m| m.msg_type == msg_type)
    }

    /// Payload of a message that must be present.
    pub fn require(&self, msg_type: MessageType) -> Result<&[u8], FormatError> {
        self.find(msg_type)
            .map(|m| m.data.as_slice())
            .ok_or(FormatError::MissingMessage(msg_type))
    }
}

fn verify_checksum(data: &[u8], start: usize, end: usize) -> Result<(), FormatError> {
    let mut c = Cursor::at(data, end);
    let stored = c.u32()?;
    let computed = jenkins_lookup3(&data[start..end]);
    if stored != computed {
        return Err(FormatError::ChecksumMismatch {
            expected: stored,
            computed,
        });
    }
    Ok(())
}

fn read_messages(
    body: &[u8],
    creation_order: bool,
    messages: &mut Vec<HeaderMessage>,
    continuations: &mut Vec<Vec<u8>>,
) -> Result<(), FormatError> {
    let prefix = if creation_order { 6 } else { 4 };
    let mut c = Cursor::new(body);
    // Anything shorter than a message prefix is gap padding.
    while c.remaining() >= prefix {
        let raw_type = c.u8()?;
        let size = c.u16()? as usize;
        let flags = c.u8()?;
        if creation_order {
            c.skip(2)?;
        }
        let payload = c.bytes(size)?;
        let msg_type = MessageType::from_u16(u16::from(raw_type));
        match msg_type {
            MessageType::Nil => {}
            MessageType::Unknown(id) if flags & MSG_FAIL_IF_UNKNOWN != 0 => {
                return Err(FormatError::UnsupportedMessage(id));
            }
            MessageType::ObjectHeaderContinuation => continuations.push(payload.to_vec()),
            _ => messages.push(HeaderMessage {
                msg_type,
                flags,
                data: payload.to_vec(),
            }),
        }
    }
    Ok(())
}
