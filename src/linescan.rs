use std::{fmt, net::SocketAddr, sync::Arc, thread, time::Duration};

use anyhow::Context;

use crate::{
    board::{BoardSession, Report, ReportListener},
    cli::LineScanOpts,
    driver::{Sequence, drive},
    error::{Error, Result},
    init::{PHASE_REPORT_ID, TRANSITION_ID},
    link::{TcpTransport, Transport},
    proto::phase::IDLE_CODE,
    sink::{DataSink, DirSink, Journal},
    stage::{Sign, StageClient, StageCommand},
};

/// Host -> board: scan setup, sent before the phase transition request.
pub const SCAN_SETUP_ID: u32 = 0x14;
/// Board -> host: move the stage to the approach position.
pub const APPROACH_REQUEST_ID: u8 = 0x05;
/// Board -> host: move the stage through the measurement.
pub const MEASURE_REQUEST_ID: u8 = 0x06;
/// Host -> board: approach move done.
pub const APPROACH_DONE_ID: u32 = 0x09;
/// Host -> board: measurement move done.
pub const MEASURE_DONE_ID: u32 = 0x0A;

/// Next inbound message the scan is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    ScanPhase,
    Approach,
    Measure,
    Idle,
}

impl ScanStep {
    pub fn command_id(self) -> u8 {
        match self {
            ScanStep::ScanPhase | ScanStep::Idle => PHASE_REPORT_ID,
            ScanStep::Approach => APPROACH_REQUEST_ID,
            ScanStep::Measure => MEASURE_REQUEST_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    NotStarted,
    Waiting(ScanStep),
    Complete,
    Error,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::NotStarted => f.write_str("NOT_STARTED"),
            ScanState::Waiting(step) => write!(f, "WAITING({step:?})"),
            ScanState::Complete => f.write_str("COMPLETE"),
            ScanState::Error => f.write_str("ERROR"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub axis: char,
    pub sign: Sign,
    pub pulses: u32,
    pub settle: Duration,
    pub scan_param: u32,
    pub scan_phase: u32,
    pub idle_phase: u32,
    pub read_id: u32,
    pub read_size: u32,
    pub filename: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            axis: '1',
            sign: Sign::Plus,
            pulses: 1000,
            settle: Duration::from_millis(500),
            scan_param: 0,
            scan_phase: 0x54,
            idle_phase: IDLE_CODE,
            read_id: 0x54,
            read_size: 43_400,
            filename: "linescan_data.bin".into(),
        }
    }
}

impl From<&LineScanOpts> for ScanConfig {
    fn from(o: &LineScanOpts) -> Self {
        Self {
            axis: o.stage.axis,
            sign: o.direction,
            pulses: o.pulses,
            settle: Duration::from_millis(o.settle_ms),
            scan_param: o.scan_param,
            scan_phase: o.scan_phase,
            idle_phase: o.idle_phase,
            read_id: o.read_id,
            read_size: o.read_size,
            filename: o.out.clone(),
        }
    }
}

/// Bridges board move requests to stage commands, strictly in order:
/// scan phase, approach (0x05), measure (0x06), idle, bulk read.
pub struct LineScan<S: DataSink> {
    transport: Arc<dyn Transport>,
    listen_addr: SocketAddr,
    board: BoardSession,
    stage: StageClient,
    journal: Journal,
    config: ScanConfig,
    sink: S,
    state: ScanState,
    listener: Option<ReportListener>,
}

impl<S: DataSink> LineScan<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn Transport>,
        board_addr: SocketAddr,
        stage_addr: SocketAddr,
        listen_addr: SocketAddr,
        timeouts: (Duration, Duration),
        config: ScanConfig,
        sink: S,
        journal: Journal,
    ) -> Self {
        let (board_timeout, stage_timeout) = timeouts;
        let board = BoardSession::new(transport.clone(), board_addr, board_timeout, journal.clone());
        let stage = StageClient::new(transport.clone(), stage_addr, stage_timeout, journal.clone());
        Self {
            transport,
            listen_addr,
            board,
            stage,
            journal,
            config,
            sink,
            state: ScanState::NotStarted,
            listener: None,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Opens the listener, then asks the board to enter the scan phase.
    pub fn start(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Err(Error::AlreadyStarted);
        }
        if self.state == ScanState::Error {
            return Err(Error::Protocol(
                "line scan failed earlier; reset before starting".into(),
            ));
        }
        self.begin().map_err(|e| self.fail(e))
    }

    fn begin(&mut self) -> Result<()> {
        let listener = ReportListener::bind(&*self.transport, self.listen_addr)?;
        self.journal.info(format!(
            "scan: listening on {}, board at {}",
            listener.local_addr(),
            self.board.addr()
        ));
        self.listener = Some(listener);
        self.state = ScanState::Waiting(ScanStep::ScanPhase);

        self.board.command(SCAN_SETUP_ID, self.config.scan_param)?;
        self.journal.info("scan: setup accepted");
        self.board.command(TRANSITION_ID, self.config.scan_phase)?;
        self.journal.info(format!(
            "scan: requested phase 0x{:08X}",
            self.config.scan_phase
        ));
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
        self.state = ScanState::NotStarted;
        self.journal.info("scan: reset");
    }

    fn on_report(&mut self, report: Report) -> Result<()> {
        let ScanState::Waiting(expected) = self.state else {
            return Ok(());
        };
        if report.command_id() != expected.command_id() {
            return Err(Error::Protocol(format!(
                "expected id 0x{:02X} ({expected:?}), board sent 0x{:02X}",
                expected.command_id(),
                report.command_id()
            )));
        }
        if report.status != 0 {
            self.journal
                .warn(format!("scan: report carries status 0x{:08X}", report.status));
        }

        match expected {
            ScanStep::ScanPhase => {
                if report.data != self.config.scan_phase {
                    self.journal.warn(format!(
                        "scan: phase 0x{:08X} while waiting for scan phase",
                        report.data
                    ));
                    return Ok(());
                }
                self.journal.info("scan: board entered scan phase");
                self.state = ScanState::Waiting(ScanStep::Approach);
            }
            ScanStep::Approach => {
                self.journal.info("scan: approach move requested");
                self.move_stage(StageCommand::Home {
                    axis: self.config.axis,
                })?;
                self.board.command(APPROACH_DONE_ID, 0)?;
                self.state = ScanState::Waiting(ScanStep::Measure);
            }
            ScanStep::Measure => {
                self.journal.info("scan: measurement move requested");
                self.move_stage(StageCommand::Move {
                    axis: self.config.axis,
                    sign: self.config.sign,
                    pulses: self.config.pulses,
                })?;
                self.board.command(MEASURE_DONE_ID, 0)?;
                self.state = ScanState::Waiting(ScanStep::Idle);
            }
            ScanStep::Idle => {
                if report.data != self.config.idle_phase {
                    self.journal.warn(format!(
                        "scan: phase 0x{:08X} while waiting for idle",
                        report.data
                    ));
                    return Ok(());
                }
                self.listener = None;
                self.collect()?;
                self.state = ScanState::Complete;
                self.journal.info("scan: complete");
            }
        }
        Ok(())
    }

    /// Positioning command, settle, then G. Both must be acknowledged.
    fn move_stage(&mut self, command: StageCommand) -> Result<()> {
        if !self.stage.send(&command) {
            return Err(Error::Stage {
                command: command.to_string(),
            });
        }
        thread::sleep(self.config.settle);
        if !self.stage.send(&StageCommand::Go) {
            return Err(Error::Stage {
                command: StageCommand::Go.to_string(),
            });
        }
        Ok(())
    }

    fn collect(&mut self) -> Result<()> {
        let size = self.config.read_size;
        self.journal
            .info(format!("scan: reading {size} bytes (id=0x{:02X})", self.config.read_id));
        let out = self.board.read(self.config.read_id, 0, size)?;
        match out.status {
            Some(0) => {}
            Some(code) => {
                return Err(Error::Protocol(format!(
                    "bulk read ended with status 0x{code:08X}"
                )));
            }
            None => self
                .journal
                .warn("scan: bulk read ended without a status word"),
        }
        if out.data.len() < size as usize {
            self.journal.warn(format!(
                "scan: received {} of {size} bytes",
                out.data.len()
            ));
        }
        self.sink
            .deliver(&self.config.filename, &out.data)
            .map_err(Error::Sink)?;
        self.journal.info(format!(
            "scan: {} bytes ready as {}",
            out.data.len(),
            self.config.filename
        ));
        Ok(())
    }

    fn fail(&mut self, e: Error) -> Error {
        self.journal.error(format!("scan: {e}"));
        self.listener = None;
        self.state = ScanState::Error;
        e
    }
}

impl<S: DataSink> Sequence for LineScan<S> {
    fn tick(&mut self) -> Result<()> {
        LineScan::tick(self)
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, ScanState::Complete | ScanState::Error)
    }

    fn reset(&mut self) {
        LineScan::reset(self)
    }
}

pub fn run(opts: LineScanOpts) -> anyhow::Result<()> {
    let mut scan = LineScan::new(
        Arc::new(TcpTransport),
        opts.seq.board_addr(),
        opts.stage.addr(),
        opts.seq.listen_addr(),
        (opts.seq.timeout(), opts.stage.timeout()),
        ScanConfig::from(&opts),
        DirSink::new(&opts.out_dir),
        Journal::tracing(),
    );
    scan.start().context("starting line scan")?;
    drive(&mut scan, opts.seq.tick(), opts.seq.deadline()).context("line scan")?;
    tracing::info!(state = %scan.state(), "line scan finished");
    Ok(())
}
