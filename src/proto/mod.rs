pub mod packet;
pub mod phase;

pub use packet::{CommandPacket, OpCode, StatusWord};
pub use phase::Phase;
