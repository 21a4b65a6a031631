use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use crate::stage::Sign;

#[derive(Parser, Debug, Clone)]
#[command(name = "jiglink", about = "Control board and stage controller driver")]
pub struct Cli {
    /// Verbose logging (overrides RUST_LOG)
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Run a single write or read transaction against the board
    Send(SendOpts),
    /// Follow the board's boot phases, answering STANDBY with RECONSTRUCT
    Init(InitOpts),
    /// Run the line-scan handshake between the board and the stage
    Linescan(LineScanOpts),
    /// Send one command to the stage controller
    Stage(StageCmdOpts),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Write,
    Read,
}

#[derive(Args, Debug, Clone)]
pub struct SendOpts {
    /// Board IP address
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub ip: IpAddr,
    /// Board command port
    #[arg(long, default_value_t = 60200)]
    pub port: u16,
    /// Connect/read timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
    #[arg(long, value_enum, default_value_t = OpKind::Write)]
    pub op: OpKind,
    /// Command id (0-255, decimal or 0x-hex)
    #[arg(long, default_value = "1", value_parser = parse_u32)]
    pub id: u32,
    /// 24-bit offset
    #[arg(long, default_value = "0", value_parser = parse_u32)]
    pub offset: u32,
    /// 24-bit data size in bytes
    #[arg(long, default_value = "1024", value_parser = parse_u32)]
    pub size: u32,
    /// File whose bytes are written (write only)
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// File name for received data (read only)
    #[arg(long, default_value = "received_data.bin")]
    pub out: String,
    /// Directory received data is saved into
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

impl SendOpts {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// Shared by the monitored sequences: where the board listens, where we listen.
#[derive(Args, Debug, Clone)]
pub struct SequenceOpts {
    /// Board IP address
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub board_ip: IpAddr,
    /// Board listener port
    #[arg(long, default_value_t = 60202)]
    pub board_port: u16,
    /// Local address reports are accepted on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub listen_ip: IpAddr,
    /// Local report port
    #[arg(long, default_value_t = 60201)]
    pub listen_port: u16,
    /// Connect/read timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
    /// Delay between accept polls in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub tick_ms: u64,
    /// Give up when the sequence has not finished after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,
}

impl SequenceOpts {
    pub fn board_addr(&self) -> SocketAddr {
        SocketAddr::new(self.board_ip, self.board_port)
    }
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.listen_port)
    }
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[derive(Args, Debug, Clone)]
pub struct StageOpts {
    /// Stage controller IP address
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub stage_ip: IpAddr,
    #[arg(long, default_value_t = 8000)]
    pub stage_port: u16,
    /// Stage connect/read timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub stage_timeout_ms: u64,
    /// Axis identifier sent with H and M commands
    #[arg(long, default_value_t = '1')]
    pub axis: char,
}

impl StageOpts {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.stage_ip, self.stage_port)
    }
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }
}

#[derive(Args, Debug, Clone)]
pub struct InitOpts {
    #[command(flatten)]
    pub seq: SequenceOpts,
}

#[derive(Args, Debug, Clone)]
pub struct LineScanOpts {
    #[command(flatten)]
    pub seq: SequenceOpts,
    #[command(flatten)]
    pub stage: StageOpts,
    /// Direction of the measurement move: + or -
    #[arg(long, default_value = "+", allow_hyphen_values = true)]
    pub direction: Sign,
    /// Pulse count of the measurement move
    #[arg(long, default_value_t = 1000)]
    pub pulses: u32,
    /// Settling delay between a move command and G, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub settle_ms: u64,
    /// Parameter word sent with the scan setup command (0x14)
    #[arg(long, default_value = "0", value_parser = parse_u32)]
    pub scan_param: u32,
    /// Phase code the board reports while scanning
    #[arg(long, default_value = "0x54", value_parser = parse_u32)]
    pub scan_phase: u32,
    /// Phase code the board reports when the scan is done
    #[arg(long, default_value = "0x10", value_parser = parse_u32)]
    pub idle_phase: u32,
    /// Command id of the final bulk read
    #[arg(long, default_value = "0x54", value_parser = parse_u32)]
    pub read_id: u32,
    /// Size of the final bulk read in bytes
    #[arg(long, default_value = "43400", value_parser = parse_u32)]
    pub read_size: u32,
    /// File name for the scan data
    #[arg(long, default_value = "linescan_data.bin")]
    pub out: String,
    /// Directory the scan data is saved into
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StageCmdOpts {
    #[command(flatten)]
    pub stage: StageOpts,
    #[command(subcommand)]
    pub action: StageAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StageAction {
    /// Home the axis (H)
    Home,
    /// Relative move (M)
    Move {
        #[arg(long, default_value = "+", allow_hyphen_values = true)]
        direction: Sign,
        #[arg(long)]
        pulses: u32,
    },
    /// Execute queued moves (G)
    Go,
}

/// Decimal or 0x-prefixed hex.
pub fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|_| format!("expected a decimal or 0x-hex integer, got {s:?}"))
}
