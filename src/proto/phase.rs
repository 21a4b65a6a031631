use std::fmt;

/// Firmware lifecycle phase carried in a phase report's data word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Standby,
    Reconstruct,
    Idle,
    Unknown(u32),
}

pub const INITIALIZE_CODE: u32 = 0x0000_0000;
pub const STANDBY_CODE: u32 = 0x0000_0008;
pub const RECONSTRUCT_CODE: u32 = 0x0000_002E;
pub const IDLE_CODE: u32 = 0x0000_0010;

impl Phase {
    pub fn from_code(code: u32) -> Self {
        match code {
            INITIALIZE_CODE => Phase::Initialize,
            STANDBY_CODE => Phase::Standby,
            RECONSTRUCT_CODE => Phase::Reconstruct,
            IDLE_CODE => Phase::Idle,
            other => Phase::Unknown(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Phase::Initialize => INITIALIZE_CODE,
            Phase::Standby => STANDBY_CODE,
            Phase::Reconstruct => RECONSTRUCT_CODE,
            Phase::Idle => IDLE_CODE,
            Phase::Unknown(c) => c,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initialize => f.write_str("INITIALIZE"),
            Phase::Standby => f.write_str("STANDBY"),
            Phase::Reconstruct => f.write_str("RECONSTRUCT"),
            Phase::Idle => f.write_str("IDLE"),
            Phase::Unknown(c) => write!(f, "UNKNOWN(0x{c:08X})"),
        }
    }
}
