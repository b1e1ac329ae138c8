//! Internal logging for the hook itself
//!
//! The hook reports malformed records, failed writes and lifecycle events
//! through a [`Diagnostics`] handle passed in at construction. Output goes to a
//! [`DiagnosticSink`]; the default prints errors to stderr.

use super::log_entry::LogEntry;
use super::log_level::LogLevel;
use super::record::Record;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Destination for diagnostic entries
pub trait DiagnosticSink: Send + Sync {
    fn write(&self, entry: &LogEntry);
    fn name(&self) -> &str;
}

/// Cloneable logging handle with a runtime-adjustable minimum level
#[derive(Clone)]
pub struct Diagnostics {
    min_level: Arc<RwLock<LogLevel>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn DiagnosticSink>, min_level: LogLevel) -> Self {
        Self {
            min_level: Arc::new(RwLock::new(min_level)),
            sink,
        }
    }

    /// Errors only, to stderr
    pub fn stderr() -> Self {
        Self::new(Arc::new(crate::sinks::ConsoleSink::new()), LogLevel::Error)
    }

    pub fn min_level(&self) -> LogLevel {
        *self.min_level.read()
    }

    /// Change the threshold for this handle and all its clones
    pub fn set_min_level(&self, level: LogLevel) {
        *self.min_level.write() = level;
    }

    #[inline]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= *self.min_level.read()
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if self.enabled(level) {
            self.sink.write(&LogEntry::new(level, message));
        }
    }

    pub fn log_with_fields(&self, level: LogLevel, message: impl Into<String>, fields: Record) {
        if self.enabled(level) {
            self.sink
                .write(&LogEntry::new(level, message).with_fields(fields));
        }
    }

    #[inline]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::stderr()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("min_level", &self.min_level())
            .field("sink", &self.sink.name())
            .finish()
    }
}
