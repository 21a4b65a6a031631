//! Host side of the control board link: the 12-byte command protocol, the
//! board's boot and line-scan sequences, and the stage controller's ASCII
//! command channel.

pub mod board;
pub mod cli;
pub mod driver;
pub mod error;
pub mod init;
pub mod linescan;
pub mod link;
pub mod manual;
pub mod proto;
pub mod sink;
pub mod stage;

pub use error::{Error, Result};
