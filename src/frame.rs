//! RFC 6455 frame types shared by the WebSocket codec.

use crate::error::Error;

/// Maximum payload size this client will allocate a buffer for. Guards
/// against a malicious or corrupt length field asking for an unreasonable
/// allocation on a constrained device.
pub const MAX_PAYLOAD_SIZE: usize = 64 << 20; // 64 MiB

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            _ => Err(Error::InvalidOpcode),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// A single, unfragmented WebSocket frame. This client never emits
/// continuation frames (fin is always set on writes) and never reassembles
/// them on read — multi-frame continuation is a Non-goal.
#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self { fin, opcode, payload }
    }

    pub fn text(payload: Vec<u8>) -> Self {
        Self::new(true, OpCode::Text, payload)
    }

    pub fn close(payload: Vec<u8>) -> Self {
        Self::new(true, OpCode::Close, payload)
    }

    pub fn pong(payload: Vec<u8>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_roundtrips_through_its_wire_byte() {
        assert_eq!(OpCode::from_byte(0x0).unwrap(), OpCode::Continuation);
        assert_eq!(OpCode::from_byte(0x1).unwrap(), OpCode::Text);
        assert_eq!(OpCode::Text.as_u8(), 0x1);
        assert!(OpCode::from_byte(0x3).is_err());
    }

    #[test]
    fn control_frames_are_flagged() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Binary.is_control());
    }

    #[test]
    fn frame_new_stores_fields_verbatim() {
        let frame = Frame::new(false, OpCode::Binary, vec![1, 2, 3]);
        assert!(!frame.fin);
        assert_eq!(frame.opcode, OpCode::Binary);
        assert_eq!(frame.payload, vec![1, 2, 3]);
    }
}
