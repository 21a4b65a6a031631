use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use jiglink::{cli, init, linescan, manual, stage};

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(args.debug);
    match args.cmd {
        cli::Cmd::Send(opts) => manual::run(opts),
        cli::Cmd::Init(opts) => init::run(opts),
        cli::Cmd::Linescan(opts) => linescan::run(opts),
        cli::Cmd::Stage(opts) => stage::run(opts),
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
