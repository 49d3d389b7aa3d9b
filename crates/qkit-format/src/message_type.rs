//! HDF5 object header message type identifiers.

/// Header message types the store writes or has to recognise when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Nil,
    Dataspace,
    LinkInfo,
    Datatype,
    FillValueOld,
    FillValue,
    Link,
    DataLayout,
    GroupInfo,
    FilterPipeline,
    Attribute,
    ObjectHeaderContinuation,
    SymbolTable,
    ObjectModificationTime,
    AttributeInfo,
    /// Any other message, with its raw type ID.
    Unknown(u16),
}

const TABLE: [(MessageType, u16); 15] = [
    (MessageType::Nil, 0x0000),
    (MessageType::Dataspace, 0x0001),
    (MessageType::LinkInfo, 0x0002),
    (MessageType::Datatype, 0x0003),
    (MessageType::FillValueOld, 0x0004),
    (MessageType::FillValue, 0x0005),
    (MessageType::Link, 0x0006),
    (MessageType::DataLayout, 0x0008),
    (MessageType::GroupInfo, 0x000A),
    (MessageType::FilterPipeline, 0x000B),
    (MessageType::Attribute, 0x000C),
    (MessageType::ObjectHeaderContinuation, 0x0010),
    (MessageType::SymbolTable, 0x0011),
    (MessageType::ObjectModificationTime, 0x0012),
    (MessageType::AttributeInfo, 0x0015),
];

impl MessageType {
    /// Convert a raw type ID.
    pub fn from_u16(val: u16) -> MessageType {
        TABLE
            .iter()
            .find(|(_, id)| *id == val)
            .map_or(MessageType::Unknown(val), |(mt, _)| *mt)
    }

    /// Convert back to the raw type ID.
    pub fn to_u16(self) -> u16 {
        if let MessageType::Unknown(id) = self {
            return id;
        }
        TABLE
            .iter()
            .find(|(mt, _)| *mt == self)
            .map_or(0, |(_, id)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ids() {
        assert_eq!(MessageType::from_u16(0x000C), MessageType::Attribute);
        assert_eq!(MessageType::DataLayout.to_u16(), 0x0008);
        assert_eq!(MessageType::from_u16(0x0010), MessageType::ObjectHeaderContinuation);
    }

    #[test]
    fn unknown_ids_survive() {
        let mt = MessageType::from_u16(0x0017);
        assert_eq!(mt, MessageType::Unknown(0x0017));
        assert_eq!(mt.to_u16(), 0x0017);
    }
}
