use std::fmt;

use crate::error::{Error, Result};

pub const FRAME_LEN: usize = 12;
pub const STATUS_LEN: usize = 4;
/// Largest value a 24-bit offset/size field can carry.
pub const MAX_U24: u32 = (1 << 24) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Write,
    Read,
}

impl OpCode {
    pub fn as_byte(self) -> u8 {
        match self {
            OpCode::Write => 0x3B,
            OpCode::Read => 0x3C,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        match b {
            0x3B => Ok(OpCode::Write),
            0x3C => Ok(OpCode::Read),
            other => Err(Error::Protocol(format!("unknown op code 0x{other:02X}"))),
        }
    }
}

/// One 12-byte command frame. Fields are range-checked on construction so a
/// built packet always encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket {
    pub op: OpCode,
    pub command_id: u8,
    pub offset: u32,
    pub data_size: u32,
}

impl CommandPacket {
    pub fn new(op: OpCode, command_id: u32, offset: u32, data_size: u32) -> Result<Self> {
        let command_id = u8::try_from(command_id).map_err(|_| Error::Encoding {
            field: "command_id",
            value: command_id,
            max: u8::MAX as u32,
        })?;
        check_u24("offset", offset)?;
        check_u24("data_size", data_size)?;
        Ok(Self {
            op,
            command_id,
            offset,
            data_size,
        })
    }

    pub fn write(command_id: u32, data_size: u32) -> Result<Self> {
        Self::new(OpCode::Write, command_id, 0, data_size)
    }

    pub fn read(command_id: u32, data_size: u32) -> Result<Self> {
        Self::new(OpCode::Read, command_id, 0, data_size)
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[0] = self.op.as_byte();
        out[2] = self.command_id;
        out[3..6].copy_from_slice(&self.offset.to_be_bytes()[1..]);
        out[6..9].copy_from_slice(&self.data_size.to_be_bytes()[1..]);
        out
    }

    /// Reserved bytes are not checked; the board is not strict about them either.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != FRAME_LEN {
            return Err(Error::Framing {
                what: "command packet",
                expected: FRAME_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            op: OpCode::try_from(buf[0])?,
            command_id: buf[2],
            offset: u24_at(&buf[3..6]),
            data_size: u24_at(&buf[6..9]),
        })
    }
}

impl fmt::Display for CommandPacket {
    /// Space-separated hex, as shown in operator logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.to_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Public API: encode a frame straight from raw field values.
pub fn encode(op: OpCode, command_id: u32, offset: u32, data_size: u32) -> Result<[u8; FRAME_LEN]> {
    CommandPacket::new(op, command_id, offset, data_size).map(|p| p.to_bytes())
}

/// Public API: decode a 12-byte frame.
pub fn decode(buf: &[u8]) -> Result<CommandPacket> {
    CommandPacket::decode(buf)
}

/// Status words are opaque; zero is success.
pub type StatusWord = u32;

pub fn encode_status(code: StatusWord) -> [u8; STATUS_LEN] {
    code.to_be_bytes()
}

pub fn decode_status(buf: &[u8]) -> Result<StatusWord> {
    decode_word("status word", buf)
}

/// 4-byte big-endian word; used for both status and report data values.
pub fn decode_word(what: &'static str, buf: &[u8]) -> Result<u32> {
    let arr: [u8; 4] = buf.try_into().map_err(|_| Error::Framing {
        what,
        expected: STATUS_LEN,
        got: buf.len(),
    })?;
    Ok(u32::from_be_bytes(arr))
}

/* ---------- helpers ---------- */

fn check_u24(field: &'static str, value: u32) -> Result<()> {
    if value > MAX_U24 {
        return Err(Error::Encoding {
            field,
            value,
            max: MAX_U24,
        });
    }
    Ok(())
}

fn u24_at(b: &[u8]) -> u32 {
    (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32
}
