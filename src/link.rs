use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    time::Duration,
};

// ============================================================================
// Capabilities
// ============================================================================

/// A connected byte stream to a peer (board or stage controller).
pub trait Link: Read + Write + Send {}
impl<T: Read + Write + Send> Link for T {}

/// Listening endpoint the board connects to with reports and move requests.
/// Dropping it closes the socket.
pub trait Acceptor: Send {
    /// Returns `Ok(None)` when nothing is pending. Never blocks.
    fn try_accept(&mut self) -> io::Result<Option<Box<dyn Link>>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Both roles the host plays: initiator (`dial`) and listener (`bind`).
pub trait Transport: Send + Sync {
    fn dial(&self, addr: SocketAddr, timeout: Duration) -> io::Result<Box<dyn Link>>;

    fn bind(&self, addr: SocketAddr) -> io::Result<Box<dyn Acceptor>>;
}

// ============================================================================
// TCP
// ============================================================================

/// Read timeout applied to inbound report connections.
const INBOUND_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TcpTransport;

impl Transport for TcpTransport {
    fn dial(&self, addr: SocketAddr, timeout: Duration) -> io::Result<Box<dyn Link>> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn bind(&self, addr: SocketAddr) -> io::Result<Box<dyn Acceptor>> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Box::new(TcpAcceptor { listener }))
    }
}

pub struct TcpAcceptor {
    listener: TcpListener,
}

impl Acceptor for TcpAcceptor {
    fn try_accept(&mut self) -> io::Result<Option<Box<dyn Link>>> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "inbound connection");
                // accepted sockets may inherit non-blocking mode
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(INBOUND_READ_TIMEOUT))?;
                Ok(Some(Box::new(stream)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Reads until `buf` is full or the peer closes. Returns the bytes read.
pub fn read_full(link: &mut dyn Link, buf: &mut [u8]) -> io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match link.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(got)
}

// ============================================================================
// In-process doubles for tests
// ============================================================================

#[cfg(test)]
pub mod mock {
    use std::{
        collections::VecDeque,
        io::{self, Cursor, Read, Write},
        net::SocketAddr,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::{Acceptor, Link, Transport};
    use crate::proto::packet::CommandPacket;

    /// Serves scripted bytes and records what was written to it.
    pub struct MockLink {
        input: Cursor<Vec<u8>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for MockLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    enum Dial {
        Respond(Vec<u8>),
        Refuse,
    }

    #[derive(Default)]
    struct State {
        dials: VecDeque<Dial>,
        dialed: Vec<(SocketAddr, Arc<Mutex<Vec<u8>>>)>,
        inbound: VecDeque<Vec<u8>>,
        listener_open: bool,
        binds: usize,
    }

    /// Scripted transport. Dials are answered in queue order; an empty queue
    /// refuses the connection.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        state: Arc<Mutex<State>>,
    }

    impl MockTransport {
        pub fn respond(&self, bytes: impl Into<Vec<u8>>) -> &Self {
            let bytes = bytes.into();
            self.state.lock().unwrap().dials.push_back(Dial::Respond(bytes));
            self
        }

        pub fn refuse(&self) -> &Self {
            self.state.lock().unwrap().dials.push_back(Dial::Refuse);
            self
        }

        /// Queue an inbound connection carrying `bytes`.
        pub fn push_inbound(&self, bytes: impl Into<Vec<u8>>) {
            self.state.lock().unwrap().inbound.push_back(bytes.into());
        }

        /// Every dial made so far with the bytes written on it.
        pub fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
            let st = self.state.lock().unwrap();
            st.dialed
                .iter()
                .map(|(addr, w)| (*addr, w.lock().unwrap().clone()))
                .collect()
        }

        pub fn sent_to(&self, addr: SocketAddr) -> Vec<Vec<u8>> {
            self.sent()
                .into_iter()
                .filter(|(a, _)| *a == addr)
                .map(|(_, w)| w)
                .collect()
        }

        pub fn listener_open(&self) -> bool {
            self.state.lock().unwrap().listener_open
        }

        pub fn binds(&self) -> usize {
            self.state.lock().unwrap().binds
        }
    }

    impl Transport for MockTransport {
        fn dial(&self, addr: SocketAddr, _timeout: Duration) -> io::Result<Box<dyn Link>> {
            let mut st = self.state.lock().unwrap();
            match st.dials.pop_front() {
                Some(Dial::Respond(bytes)) => {
                    let written = Arc::new(Mutex::new(Vec::new()));
                    st.dialed.push((addr, written.clone()));
                    Ok(Box::new(MockLink {
                        input: Cursor::new(bytes),
                        written,
                    }))
                }
                Some(Dial::Refuse) | None => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "mock refused",
                )),
            }
        }

        fn bind(&self, _addr: SocketAddr) -> io::Result<Box<dyn Acceptor>> {
            let mut st = self.state.lock().unwrap();
            if st.listener_open {
                return Err(io::Error::new(io::ErrorKind::AddrInUse, "mock in use"));
            }
            st.listener_open = true;
            st.binds += 1;
            Ok(Box::new(MockAcceptor {
                state: self.state.clone(),
            }))
        }
    }

    struct MockAcceptor {
        state: Arc<Mutex<State>>,
    }

    impl Acceptor for MockAcceptor {
        fn try_accept(&mut self) -> io::Result<Option<Box<dyn Link>>> {
            let next = self.state.lock().unwrap().inbound.pop_front();
            Ok(next.map(|bytes| {
                Box::new(MockLink {
                    input: Cursor::new(bytes),
                    written: Arc::default(),
                }) as Box<dyn Link>
            }))
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 60201)))
        }
    }

    impl Drop for MockAcceptor {
        fn drop(&mut self) {
            if let Ok(mut st) = self.state.lock() {
                st.listener_open = false;
            }
        }
    }

    /// Bytes of an inbound report: write frame, 4-byte data, 4-byte status.
    pub fn report(command_id: u32, data: u32, status: u32) -> Vec<u8> {
        let mut out = CommandPacket::write(command_id, 4).unwrap().to_bytes().to_vec();
        out.extend_from_slice(&data.to_be_bytes());
        out.extend_from_slice(&status.to_be_bytes());
        out
    }

    /// Status reply from the board.
    pub fn status(code: u32) -> Vec<u8> {
        code.to_be_bytes().to_vec()
    }
}
