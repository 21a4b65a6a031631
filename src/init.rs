use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;

use crate::{
    board::{BoardSession, Report, ReportListener},
    cli::InitOpts,
    driver::{Sequence, drive},
    error::{Error, Result},
    link::{TcpTransport, Transport},
    proto::phase::{Phase, RECONSTRUCT_CODE},
    sink::Journal,
};

/// Command id of asynchronous phase reports.
pub const PHASE_REPORT_ID: u8 = 0x03;
/// Command id of the host's phase transition request.
pub const TRANSITION_ID: u32 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    NotStarted,
    Waiting,
    Phase(Phase),
    Complete,
    Error,
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitState::NotStarted => f.write_str("NOT_STARTED"),
            InitState::Waiting => f.write_str("WAITING"),
            InitState::Phase(p) => write!(f, "{p}"),
            InitState::Complete => f.write_str("COMPLETE"),
            InitState::Error => f.write_str("ERROR"),
        }
    }
}

/// Follows the board through INITIALIZE, STANDBY, RECONSTRUCT and IDLE.
/// The only automatic action is the RECONSTRUCT request on STANDBY.
pub struct InitSequence {
    transport: Arc<dyn Transport>,
    listen_addr: SocketAddr,
    board: BoardSession,
    journal: Journal,
    state: InitState,
    listener: Option<ReportListener>,
}

impl InitSequence {
    pub fn new(
        transport: Arc<dyn Transport>,
        board_addr: SocketAddr,
        listen_addr: SocketAddr,
        timeout: Duration,
        journal: Journal,
    ) -> Self {
        let board = BoardSession::new(transport.clone(), board_addr, timeout, journal.clone());
        Self {
            transport,
            listen_addr,
            board,
            journal,
            state: InitState::NotStarted,
            listener: None,
        }
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Opens the report listener. Rejected while one is open or after a
    /// failure that has not been reset.
    pub fn start(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Err(Error::AlreadyStarted);
        }
        if self.state == InitState::Error {
            return Err(Error::Protocol(
                "init sequence failed earlier; reset before starting".into(),
            ));
        }
        let listener = match ReportListener::bind(&*self.transport, self.listen_addr) {
            Ok(l) => l,
            Err(e) => return Err(self.fail(e)),
        };
        self.journal.info(format!(
            "init: waiting for phase reports on {}",
            listener.local_addr()
        ));
        self.listener = Some(listener);
        self.state = InitState::Waiting;
        Ok(())
    }

    pub fn tick(&mut self) -> Result<()> {
        let Some(listener) = self.listener.as_mut() else {
            return Ok(());
        };
        let report = match listener.poll() {
            Ok(None) => return Ok(()),
            Ok(Some(r)) => r,
            Err(e) => return Err(self.fail(e)),
        };
        self.on_report(report).map_err(|e| self.fail(e))
    }

    pub fn reset(&mut self) {
        self.listener = None;
        self.state = InitState::NotStarted;
        self.journal.info("init: reset");
    }

    fn on_report(&mut self, report: Report) -> Result<()> {
        if report.command_id() != PHASE_REPORT_ID {
            self.journal.warn(format!(
                "init: ignoring report id=0x{:02X} data=0x{:08X}",
                report.command_id(),
                report.data
            ));
            return Ok(());
        }
        if report.status != 0 {
            self.journal
                .warn(format!("init: report carries status 0x{:08X}", report.status));
        }

        let phase = Phase::from_code(report.data);
        if let Phase::Unknown(code) = phase {
            self.journal
                .warn(format!("init: unknown phase code 0x{code:08X}, ignored"));
            return Ok(());
        }
        self.journal.info(format!("init: phase {phase}"));
        self.state = InitState::Phase(phase);

        match phase {
            Phase::Standby => {
                self.journal.info("init: requesting RECONSTRUCT");
                self.board.command(TRANSITION_ID, RECONSTRUCT_CODE)?;
                self.journal.info("init: RECONSTRUCT accepted");
            }
            Phase::Idle => {
                self.listener = None;
                self.state = InitState::Complete;
                self.journal.info("init: board is idle, sequence complete");
            }
            _ => {}
        }
        Ok(())
    }

    fn fail(&mut self, e: Error) -> Error {
        self.journal.error(format!("init: {e}"));
        self.listener = None;
        self.state = InitState::Error;
        e
    }
}

impl Sequence for InitSequence {
    fn tick(&mut self) -> Result<()> {
        InitSequence::tick(self)
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, InitState::Complete | InitState::Error)
    }

    fn reset(&mut self) {
        InitSequence::reset(self)
    }
}

pub fn run(opts: InitOpts) -> anyhow::Result<()> {
    let seq_opts = &opts.seq;
    let mut seq = InitSequence::new(
        Arc::new(TcpTransport),
        seq_opts.board_addr(),
        seq_opts.listen_addr(),
        seq_opts.timeout(),
        Journal::tracing(),
    );
    seq.start().context("starting init sequence")?;
    drive(&mut seq, seq_opts.tick(), seq_opts.deadline()).context("init sequence")?;
    tracing::info!(state = %seq.state(), "init finished");
    Ok(())
}
