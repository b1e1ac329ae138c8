//! Hook trait: entry point for log entries leaving the host logger

use super::{error::Result, log_entry::LogEntry, log_level::LogLevel};

pub trait Hook: Send + Sync {
    /// Severities this hook accepts
    fn levels(&self) -> Vec<LogLevel>;

    /// Hand `entry` to the hook, unconditionally
    fn fire(&self, entry: &LogEntry) -> Result<()>;

    fn name(&self) -> &str;

    fn accepts(&self, level: LogLevel) -> bool {
        self.levels().contains(&level)
    }

    /// Fire only when the entry's level is accepted
    fn dispatch(&self, entry: &LogEntry) -> Result<()> {
        if self.accepts(entry.level) {
            self.fire(entry)
        } else {
            Ok(())
        }
    }
}
