use std::{fs, sync::Arc};

use anyhow::{Context, Result, bail};

use crate::{
    board::{BoardSession, Outcome},
    cli::{OpKind, SendOpts},
    error,
    link::TcpTransport,
    proto::packet::{CommandPacket, OpCode},
    sink::{DataSink, DirSink, Journal},
};

/// One operator-issued transaction.
#[derive(Debug, Clone)]
pub struct ManualCommand {
    pub op: OpCode,
    pub command_id: u32,
    pub offset: u32,
    pub data_size: u32,
    /// Write source; anything past `data_size` is not sent.
    pub payload: Vec<u8>,
}

/// Runs `cmd` and reports the result to the journal. A read's data goes to
/// `sink` under `filename`. A missing or non-zero status is logged, not raised.
pub fn execute(
    board: &BoardSession,
    journal: &Journal,
    cmd: &ManualCommand,
    sink: &mut dyn DataSink,
    filename: &str,
) -> error::Result<Outcome> {
    let packet = CommandPacket::new(cmd.op, cmd.command_id, cmd.offset, cmd.data_size)?;
    journal.info(format!("target {}", board.addr()));
    journal.info(format!("command packet: {packet}"));

    let out = board.transact(&packet, &cmd.payload)?;
    match cmd.op {
        OpCode::Write => journal.info(format!("wrote {} bytes of payload", out.transferred)),
        OpCode::Read => {
            journal.info(format!("received {} bytes", out.transferred));
            sink.deliver(filename, &out.data).map_err(error::Error::Sink)?;
            journal.info(format!("data ready as {filename}"));
        }
    }
    match out.status {
        Some(0) => journal.info("status OK"),
        Some(code) => journal.error(format!("board returned error status 0x{code:08X}")),
        None => journal.warn("board sent no status word"),
    }
    Ok(out)
}

pub fn run(opts: SendOpts) -> Result<()> {
    let op = match opts.op {
        OpKind::Write => OpCode::Write,
        OpKind::Read => OpCode::Read,
    };
    let payload = match (&opts.file, op) {
        (Some(path), OpCode::Write) => {
            fs::read(path).with_context(|| format!("reading {}", path.display()))?
        }
        (None, OpCode::Write) => bail!("a write needs --file with the data to send"),
        (_, OpCode::Read) => Vec::new(),
    };
    let cmd = ManualCommand {
        op,
        command_id: opts.id,
        offset: opts.offset,
        data_size: opts.size,
        payload,
    };

    let journal = Journal::tracing();
    let board = BoardSession::new(
        Arc::new(TcpTransport),
        opts.addr(),
        std::time::Duration::from_millis(opts.timeout_ms),
        journal.clone(),
    );
    let mut sink = DirSink::new(&opts.out_dir);
    let out = execute(&board, &journal, &cmd, &mut sink, &opts.out)
        .with_context(|| format!("command 0x{:02X} to {}", opts.id, opts.addr()))?;
    if let Some(code) = out.status
        && code != 0
    {
        bail!("board returned status 0x{code:08X}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Error,
        link::mock::{self, MockTransport},
        sink::{MemoryLog, MemorySink, Severity},
    };
    use std::{net::SocketAddr, time::Duration};

    fn setup(mock: &MockTransport) -> (BoardSession, Journal, MemoryLog) {
        let log = MemoryLog::default();
        let journal = Journal::new(Arc::new(log.clone()));
        let board = BoardSession::new(
            Arc::new(mock.clone()),
            SocketAddr::from(([127, 0, 0, 1], 60200)),
            Duration::from_secs(1),
            journal.clone(),
        );
        (board, journal, log)
    }

    fn command(op: OpCode, data_size: u32, payload: &[u8]) -> ManualCommand {
        ManualCommand {
            op,
            command_id: 1,
            offset: 0,
            data_size,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn write_logs_frame_and_status() {
        let mock = MockTransport::default();
        mock.respond(mock::status(0));
        let (board, journal, log) = setup(&mock);
        let mut sink = MemorySink::default();

        let out = execute(
            &board,
            &journal,
            &command(OpCode::Write, 8, b"a,b,c\n1,2,3\n"),
            &mut sink,
            "unused.bin",
        )
        .unwrap();

        assert_eq!(out.transferred, 8);
        assert!(log.contains(Severity::Info, "3b 00 01 00 00 00 00 00 08 00 00 00"));
        assert!(log.contains(Severity::Info, "status OK"));
        assert!(sink.files.is_empty());
    }

    #[test]
    fn error_status_is_logged_not_raised() {
        let mock = MockTransport::default();
        mock.respond(mock::status(0xE1));
        let (board, journal, log) = setup(&mock);

        let out = execute(
            &board,
            &journal,
            &command(OpCode::Write, 4, b"abcd"),
            &mut MemorySink::default(),
            "x",
        )
        .unwrap();
        assert_eq!(out.status, Some(0xE1));
        assert!(log.contains(Severity::Error, "0x000000E1"));
    }

    #[test]
    fn read_hands_data_to_sink() {
        let mock = MockTransport::default();
        let mut reply = vec![9u8; 16];
        reply.extend_from_slice(&mock::status(0));
        mock.respond(reply);
        let (board, journal, _) = setup(&mock);
        let mut sink = MemorySink::default();

        execute(
            &board,
            &journal,
            &command(OpCode::Read, 16, &[]),
            &mut sink,
            "received_data.bin",
        )
        .unwrap();
        assert_eq!(sink.files, vec![("received_data.bin".to_string(), vec![9u8; 16])]);
    }

    #[test]
    fn out_of_range_size_never_dials() {
        let mock = MockTransport::default();
        let (board, journal, _) = setup(&mock);
        let r = execute(
            &board,
            &journal,
            &command(OpCode::Read, 1 << 24, &[]),
            &mut MemorySink::default(),
            "x",
        );
        assert!(matches!(r, Err(Error::Encoding { .. })));
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn refused_connection_propagates() {
        let mock = MockTransport::default();
        mock.refuse();
        let (board, journal, _) = setup(&mock);
        let r = execute(
            &board,
            &journal,
            &command(OpCode::Write, 4, b"abcd"),
            &mut MemorySink::default(),
            "x",
        );
        assert!(matches!(r, Err(Error::Connection { .. })));
    }
}
