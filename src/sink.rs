use std::{
    fmt, fs, io,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        })
    }
}

/// Receives timestamped operator-facing events.
pub trait LogSink: Send + Sync {
    fn record(&self, severity: Severity, at: DateTime<Local>, message: &str);
}

/// Receives a finished transfer buffer for later retrieval.
pub trait DataSink {
    fn deliver(&mut self, filename: &str, data: &[u8]) -> io::Result<()>;
}

/// Cloneable handle that stamps events and hands them to a sink.
#[derive(Clone)]
pub struct Journal {
    sink: Arc<dyn LogSink>,
}

impl Journal {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    pub fn log(&self, severity: Severity, message: impl AsRef<str>) {
        self.sink.record(severity, Local::now(), message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Severity::Debug, message)
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Severity::Info, message)
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(Severity::Warn, message)
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Severity::Error, message)
    }
}

/// Forwards every entry to `tracing`.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, severity: Severity, at: DateTime<Local>, message: &str) {
        let at = at.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        match severity {
            Severity::Debug => tracing::debug!(%at, "{message}"),
            Severity::Info => tracing::info!(%at, "{message}"),
            Severity::Warn => tracing::warn!(%at, "{message}"),
            Severity::Error => tracing::error!(%at, "{message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: Severity,
    pub at: DateTime<Local>,
    pub message: String,
}

/// Keeps entries in memory so a front end can render them.
#[derive(Clone, Default)]
pub struct MemoryLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLog {
    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(e) => e.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|e| e.severity == severity && e.message.contains(needle))
    }
}

impl LogSink for MemoryLog {
    fn record(&self, severity: Severity, at: DateTime<Local>, message: &str) {
        let entry = LogEntry {
            severity,
            at,
            message: message.to_string(),
        };
        match self.entries.lock() {
            Ok(mut e) => e.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Writes each delivered buffer into a directory.
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DataSink for DirSink {
    fn deliver(&mut self, filename: &str, data: &[u8]) -> io::Result<()> {
        let path = self.dir.join(filename);
        fs::write(&path, data)?;
        tracing::info!(path = %path.display(), bytes = data.len(), "saved transfer");
        Ok(())
    }
}

/// Holds delivered buffers in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub files: Vec<(String, Vec<u8>)>,
}

impl DataSink for MemorySink {
    fn deliver(&mut self, filename: &str, data: &[u8]) -> io::Result<()> {
        self.files.push((filename.to_string(), data.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_stamps_and_forwards() {
        let mem = MemoryLog::default();
        let journal = Journal::new(Arc::new(mem.clone()));
        let before = Local::now();
        journal.info("connected");
        journal.warn("short read");
        let entries = mem.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].severity, Severity::Info);
        assert!(entries[0].at >= before);
        assert!(mem.contains(Severity::Warn, "short"));
        assert!(!mem.contains(Severity::Error, "short"));
    }

    #[test]
    fn dir_sink_writes_file() {
        let dir = std::env::temp_dir().join(format!("jiglink-sink-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut sink = DirSink::new(&dir);
        sink.deliver("out.bin", &[1, 2, 3]).unwrap();
        assert_eq!(fs::read(dir.join("out.bin")).unwrap(), vec![1, 2, 3]);
        fs::remove_dir_all(&dir).unwrap();
    }
}
