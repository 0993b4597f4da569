//! Diagnostic sink: the one channel from an extension back into the engine
//!
//! Extensions are constructed before the engine's logging subsystem exists, so
//! the sink is late-bound: the engine attaches it exactly once after open, and
//! from then on every extension call may read it concurrently.
//!
//! `TracingSink` forwards to `tracing`; `RecordingSink` keeps records in memory
//! so tests can assert on what a host callback logged.

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::error::{BridgeError, BridgeResult};

/// Severity of a diagnostic record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    /// Banner lines written once at startup
    Header,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
            LogLevel::Header => "HEADER",
        };
        f.write_str(s)
    }
}

/// Logging facility owned by the engine and shared with its extensions.
///
/// Implementations must tolerate concurrent calls from any engine thread.
pub trait DiagnosticSink: Send + Sync {
    /// Record one message. `source` names the extension that produced it.
    fn log(&self, level: LogLevel, source: &str, message: &str);
}

/// Sink that forwards every record to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn log(&self, level: LogLevel, source: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(source, "{}", message),
            LogLevel::Info | LogLevel::Header => tracing::info!(source, "{}", message),
            LogLevel::Warn => tracing::warn!(source, "{}", message),
            LogLevel::Error | LogLevel::Fatal => tracing::error!(source, level = %level, "{}", message),
        }
    }
}

/// One captured record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub source: String,
    pub message: String,
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far, in arrival order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// True if any record's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.records.lock().iter().any(|r| r.message.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn log(&self, level: LogLevel, source: &str, message: &str) {
        self.records.lock().push(LogRecord {
            level,
            source: source.to_string(),
            message: message.to_string(),
        });
    }
}

/// Single-assignment holder for a late-bound sink.
///
/// Empty until `attach`; attaching twice is an error. Reads after the
/// assignment are lock-free.
#[derive(Default)]
pub struct SinkSlot {
    sink: OnceLock<Arc<dyn DiagnosticSink>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self { sink: OnceLock::new() }
    }

    /// Attach the engine's sink. `owner` only feeds the error message.
    pub fn attach(&self, owner: &str, sink: Arc<dyn DiagnosticSink>) -> BridgeResult<()> {
        self.sink.set(sink).map_err(|_| BridgeError::SinkAlreadyAttached {
            adapter: owner.to_string(),
        })
    }

    pub fn get(&self) -> Option<&Arc<dyn DiagnosticSink>> {
        self.sink.get()
    }

    pub fn is_attached(&self) -> bool {
        self.sink.get().is_some()
    }

    /// Log through the attached sink; no-op while detached.
    pub fn log(&self, level: LogLevel, source: &str, message: &str) {
        if let Some(sink) = self.sink.get() {
            sink.log(level, source, message);
        }
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}
