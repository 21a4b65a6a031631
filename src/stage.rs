use std::{
    fmt,
    io::{Read, Write},
    net::SocketAddr,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::{Result, bail};

use crate::{
    cli::{StageAction, StageCmdOpts},
    link::{TcpTransport, Transport},
    sink::Journal,
};

/// Responses longer than this are cut off.
const RESPONSE_BUF: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sign::Plus => "+",
            Sign::Minus => "-",
        })
    }
}

impl FromStr for Sign {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "+" | "plus" => Ok(Sign::Plus),
            "-" | "minus" => Ok(Sign::Minus),
            _ => Err(format!("direction must be '+' or '-', got {s:?}")),
        }
    }
}

/// ASCII line commands understood by the stage controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCommand {
    Home { axis: char },
    Move { axis: char, sign: Sign, pulses: u32 },
    Go,
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageCommand::Home { axis } => write!(f, "H:{axis}"),
            StageCommand::Move { axis, sign, pulses } => write!(f, "M:{axis}{sign}{pulses}"),
            StageCommand::Go => f.write_str("G"),
        }
    }
}

impl StageCommand {
    /// Wire form: command text terminated by CR.
    pub fn to_line(&self) -> String {
        format!("{self}\r")
    }
}

/// One connection per command; the reply counts as success iff it contains `OK`.
pub struct StageClient {
    transport: Arc<dyn Transport>,
    addr: SocketAddr,
    timeout: Duration,
    journal: Journal,
}

impl StageClient {
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

    /// Never fails loudly: transport problems and rejections are logged and
    /// reported as `false`.
    pub fn send(&self, command: &StageCommand) -> bool {
        self.journal
            .info(format!("stage {} <- {}", self.addr, command));
        match self.exchange(command) {
            Ok(reply) if reply.contains("OK") => {
                self.journal.info(format!("stage ack {command}: {reply}"));
                true
            }
            Ok(reply) => {
                self.journal
                    .error(format!("stage rejected {command}: {reply:?}"));
                false
            }
            Err(e) => {
                self.journal
                    .error(format!("stage {} unreachable for {command}: {e}", self.addr));
                false
            }
        }
    }

    fn exchange(&self, command: &StageCommand) -> std::io::Result<String> {
        let mut link = self.transport.dial(self.addr, self.timeout)?;
        link.write_all(command.to_line().as_bytes())?;
        link.flush()?;
        let mut buf = [0u8; RESPONSE_BUF];
        let n = link.read(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf[..n]).trim().to_string())
    }
}

pub fn run(opts: StageCmdOpts) -> Result<()> {
    let command = match opts.action {
        StageAction::Home => StageCommand::Home {
            axis: opts.stage.axis,
        },
        StageAction::Move { direction, pulses } => StageCommand::Move {
            axis: opts.stage.axis,
            sign: direction,
            pulses,
        },
        StageAction::Go => StageCommand::Go,
    };
    let client = StageClient::new(
        Arc::new(TcpTransport),
        opts.stage.addr(),
        opts.stage.timeout(),
        Journal::tracing(),
    );
    if !client.send(&command) {
        bail!("stage command {} failed", command);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        link::mock::MockTransport,
        sink::{MemoryLog, Severity},
    };

    fn stage_addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 8000))
    }

    fn client(mock: &MockTransport) -> (StageClient, MemoryLog) {
        let log = MemoryLog::default();
        let c = StageClient::new(
            Arc::new(mock.clone()),
            stage_addr(),
            Duration::from_secs(1),
            Journal::new(Arc::new(log.clone())),
        );
        (c, log)
    }

    #[test]
    fn command_text() {
        assert_eq!(StageCommand::Home { axis: '1' }.to_line(), "H:1\r");
        assert_eq!(
            StageCommand::Move {
                axis: '2',
                sign: Sign::Minus,
                pulses: 5000
            }
            .to_line(),
            "M:2-5000\r"
        );
        assert_eq!(StageCommand::Go.to_line(), "G\r");
        assert_eq!("+".parse::<Sign>().unwrap(), Sign::Plus);
        assert!("x".parse::<Sign>().is_err());
    }

    #[test]
    fn ok_reply_is_success() {
        let mock = MockTransport::default();
        mock.respond(&b"  OK\r\n"[..]);
        let (c, _) = client(&mock);
        assert!(c.send(&StageCommand::Home { axis: '1' }));
        assert_eq!(mock.sent()[0], (stage_addr(), b"H:1\r".to_vec()));
    }

    #[test]
    fn error_reply_is_failure_and_logged() {
        let mock = MockTransport::default();
        mock.respond(&b"ER:01\r\n"[..]);
        let (c, log) = client(&mock);
        assert!(!c.send(&StageCommand::Go));
        assert!(log.contains(Severity::Error, "ER:01"));
    }

    #[test]
    fn unreachable_stage_is_failure_not_panic() {
        let mock = MockTransport::default();
        mock.refuse();
        let (c, log) = client(&mock);
        assert!(!c.send(&StageCommand::Go));
        assert!(log.contains(Severity::Error, "unreachable"));

        // empty reply: peer closed without answering
        mock.respond(Vec::new());
        assert!(!c.send(&StageCommand::Go));
    }
}
