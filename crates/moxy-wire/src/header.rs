//! The fixed wire-protocol message header and opcode constants.

/// Size of the message header in bytes.
pub const HEADER_LEN: usize = 16;

/// Largest frame the codec will accept, matching the
/// `maxMessageSizeBytes` the proxy advertises in handshakes.
pub const MAX_MESSAGE_SIZE: i32 = 48_000_000;

/// OP_MSG flag bits.
pub mod flag {
    pub const CHECKSUM_PRESENT: u32 = 1;
    pub const MORE_TO_COME: u32 = 1 << 1;
    pub const EXHAUST_ALLOWED: u32 = 1 << 16;
}

/// Wire opcodes this proxy understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Reply,
    Query,
    Msg,
}

impl OpCode {
    pub const fn from_i32(code: i32) -> Option<OpCode> {
        match code {
            1 => Some(OpCode::Reply),
            2004 => Some(OpCode::Query),
            2013 => Some(OpCode::Msg),
            _ => None,
        }
    }

    pub const fn as_i32(self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Query => 2004,
            OpCode::Msg => 2013,
        }
    }
}

/// The 16-byte header prefixed to every wire message, all fields
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Total frame length, header included.
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

impl MsgHeader {
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
        let field = |at: usize| i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        Self {
            message_length: field(0),
            request_id: field(4),
            response_to: field(8),
            op_code: field(12),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.message_length.to_le_bytes());
        out[4..8].copy_from_slice(&self.request_id.to_le_bytes());
        out[8..12].copy_from_slice(&self.response_to.to_le_bytes());
        out[12..16].copy_from_slice(&self.op_code.to_le_bytes());
        out
    }

    /// Byte count of the frame body following the header.
    pub fn body_len(&self) -> usize {
        (self.message_length as usize).saturating_sub(HEADER_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = MsgHeader {
            message_length: 57,
            request_id: 12,
            response_to: 7,
            op_code: OpCode::Msg.as_i32(),
        };
        assert_eq!(MsgHeader::parse(&header.to_bytes()), header);
    }

    #[test]
    fn header_fields_are_little_endian() {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = 16;
        bytes[12] = 0xD4; // 2004
        bytes[13] = 0x07;
        let header = MsgHeader::parse(&bytes);
        assert_eq!(header.message_length, 16);
        assert_eq!(header.op_code, OpCode::Query.as_i32());
        assert_eq!(header.body_len(), 0);
    }

    #[test]
    fn opcode_closed_set() {
        assert_eq!(OpCode::from_i32(2013), Some(OpCode::Msg));
        assert_eq!(OpCode::from_i32(2004), Some(OpCode::Query));
        assert_eq!(OpCode::from_i32(1), Some(OpCode::Reply));
        assert_eq!(OpCode::from_i32(2001), None);
    }
}
