use std::{
    io::{self, Write},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use crate::{
    error::{Error, Result},
    link::{Acceptor, Link, Transport, read_full},
    proto::packet::{
        CommandPacket, FRAME_LEN, OpCode, STATUS_LEN, StatusWord, decode_status, decode_word,
    },
    sink::Journal,
};

/// What came back from one outbound transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Payload bytes written (write) or received (read).
    pub transferred: usize,
    /// Received payload; empty for writes.
    pub data: Vec<u8>,
    /// `None` when the board closed before sending a full status word.
    pub status: Option<StatusWord>,
}

/// Host-as-initiator side of the board link. Every transaction is a fresh
/// connection: frame, payload, status, close.
pub struct BoardSession {
    transport: Arc<dyn Transport>,
    addr: SocketAddr,
    timeout: Duration,
    journal: Journal,
}

impl BoardSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        addr: SocketAddr,
        timeout: Duration,
        journal: Journal,
    ) -> Self {
        Self {
            transport,
            addr,
            timeout,
            journal,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs one transaction. Writes send at most `data_size` bytes of
    /// `payload`; reads collect up to `data_size` bytes and stop early if the
    /// board closes.
    pub fn transact(&self, packet: &CommandPacket, payload: &[u8]) -> Result<Outcome> {
        let mut link = self
            .transport
            .dial(self.addr, self.timeout)
            .map_err(|e| Error::connection(self.addr, e))?;
        self.journal.debug(format!("-> {} [{}]", self.addr, packet));
        self.exchange(&mut *link, packet, payload)
            .map_err(|e| Error::connection(self.addr, e))
    }

    fn exchange(
        &self,
        link: &mut dyn Link,
        packet: &CommandPacket,
        payload: &[u8],
    ) -> io::Result<Outcome> {
        link.write_all(&packet.to_bytes())?;
        let size = packet.data_size as usize;

        let (transferred, data) = match packet.op {
            OpCode::Write => {
                let chunk = &payload[..payload.len().min(size)];
                link.write_all(chunk)?;
                link.flush()?;
                (chunk.len(), Vec::new())
            }
            OpCode::Read => {
                link.flush()?;
                let mut data = vec![0u8; size];
                let got = read_full(link, &mut data)?;
                data.truncate(got);
                if got < size {
                    self.journal.warn(format!(
                        "board closed after {got} of {size} bytes (id=0x{:02X})",
                        packet.command_id
                    ));
                }
                (got, data)
            }
        };

        let mut word = [0u8; STATUS_LEN];
        let got = read_full(link, &mut word)?;
        let status = if got == STATUS_LEN {
            decode_status(&word).ok()
        } else {
            self.journal.warn(format!(
                "no status word from board (got {got} bytes, id=0x{:02X})",
                packet.command_id
            ));
            None
        };

        Ok(Outcome {
            transferred,
            data,
            status,
        })
    }

    pub fn write(
        &self,
        command_id: u32,
        offset: u32,
        data_size: u32,
        payload: &[u8],
    ) -> Result<Outcome> {
        let packet = CommandPacket::new(OpCode::Write, command_id, offset, data_size)?;
        self.transact(&packet, payload)
    }

    pub fn read(&self, command_id: u32, offset: u32, data_size: u32) -> Result<Outcome> {
        let packet = CommandPacket::new(OpCode::Read, command_id, offset, data_size)?;
        self.transact(&packet, &[])
    }

    /// Writes a single 4-byte word and requires a zero status back.
    pub fn command(&self, command_id: u32, word: u32) -> Result<()> {
        let out = self.write(command_id, 0, 4, &word.to_be_bytes())?;
        match out.status {
            Some(0) => Ok(()),
            Some(code) => Err(Error::Protocol(format!(
                "board rejected command 0x{command_id:02X} with status 0x{code:08X}"
            ))),
            None => Err(Error::connection(
                self.addr,
                io::Error::new(io::ErrorKind::UnexpectedEof, "no status word"),
            )),
        }
    }
}

// ============================================================================
// Inbound reports
// ============================================================================

/// One asynchronous message from the board: frame, data word, status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub packet: CommandPacket,
    pub data: u32,
    pub status: StatusWord,
}

impl Report {
    pub fn command_id(&self) -> u8 {
        self.packet.command_id
    }
}

/// Owns the host's listening socket; dropping it closes the socket.
pub struct ReportListener {
    acceptor: Box<dyn Acceptor>,
    addr: SocketAddr,
}

impl ReportListener {
    pub fn bind(transport: &dyn Transport, addr: SocketAddr) -> Result<Self> {
        let acceptor = transport
            .bind(addr)
            .map_err(|e| Error::connection(addr, e))?;
        let addr = acceptor.local_addr().unwrap_or(addr);
        Ok(Self { acceptor, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// One non-blocking accept attempt. A pending connection is read to the
    /// end of its report and closed.
    pub fn poll(&mut self) -> Result<Option<Report>> {
        let link = self
            .acceptor
            .try_accept()
            .map_err(|e| Error::connection(self.addr, e))?;
        match link {
            None => Ok(None),
            Some(mut link) => read_report(&mut *link, self.addr).map(Some),
        }
    }
}

pub fn read_report(link: &mut dyn Link, addr: SocketAddr) -> Result<Report> {
    let mut fill =
        |buf: &mut [u8]| read_full(&mut *link, buf).map_err(|e| Error::connection(addr, e));

    let mut frame = [0u8; FRAME_LEN];
    let got = fill(&mut frame[..])?;
    let packet = CommandPacket::decode(&frame[..got])?;

    let mut word = [0u8; 4];
    let got = fill(&mut word[..])?;
    let data = decode_word("report data", &word[..got])?;

    let got = fill(&mut word[..])?;
    let status = decode_status(&word[..got])?;

    Ok(Report {
        packet,
        data,
        status,
    })
}
