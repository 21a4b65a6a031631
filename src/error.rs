use std::{io, net::SocketAddr, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A frame field does not fit its wire width.
    #[error("cannot encode {field}={value}: exceeds {max}")]
    Encoding {
        field: &'static str,
        value: u32,
        max: u32,
    },
    #[error("bad frame length for {what}: expected {expected} bytes, got {got}")]
    Framing {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("connection to {addr} failed: {source}")]
    Connection {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("stage command {command:?} was not acknowledged")]
    Stage { command: String },
    #[error("could not store transfer: {0}")]
    Sink(#[source] io::Error),
    #[error("sequence already started; reset it first")]
    AlreadyStarted,
    #[error("sequence did not finish within {0:?}")]
    Deadline(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn connection(addr: SocketAddr, source: io::Error) -> Self {
        Error::Connection { addr, source }
    }
}
