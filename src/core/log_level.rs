//! Severity levels and per-hook level filtering

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Default)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    /// Every level, most verbose first
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    #[cfg(feature = "console")]
    pub fn color_code(&self) -> colored::Color {
        use colored::Color::*;
        match self {
            LogLevel::Trace => BrightBlack,
            LogLevel::Debug => Blue,
            LogLevel::Info => Green,
            LogLevel::Warn => Yellow,
            LogLevel::Error => Red,
            LogLevel::Fatal => BrightRed,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" | "PANIC" => Ok(LogLevel::Fatal),
            _ => Err(format!("Invalid log level: '{}'", s)),
        }
    }
}

/// Set of severities a hook accepts
///
/// An unconfigured filter accepts every level. Reads and writes go through
/// a lock so the set can be changed while producers are logging.
#[derive(Debug, Default)]
pub struct LevelFilter {
    accepted: RwLock<Option<Vec<LogLevel>>>,
}

impl LevelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter accepting exactly `levels`
    pub fn with_levels(levels: Vec<LogLevel>) -> Self {
        Self {
            accepted: RwLock::new(Some(levels)),
        }
    }

    /// Accepted levels; all of them when unconfigured
    pub fn levels(&self) -> Vec<LogLevel> {
        match self.accepted.read().as_ref() {
            Some(levels) => levels.clone(),
            None => LogLevel::ALL.to_vec(),
        }
    }

    pub fn set_levels(&self, levels: Vec<LogLevel>) {
        *self.accepted.write() = Some(levels);
    }

    /// Drop any configured set and go back to accepting everything
    pub fn reset(&self) {
        *self.accepted.write() = None;
    }

    pub fn accepts(&self, level: LogLevel) -> bool {
        match self.accepted.read().as_ref() {
            Some(levels) => levels.contains(&level),
            None => true,
        }
    }
}

impl Clone for LevelFilter {
    fn clone(&self) -> Self {
        Self {
            accepted: RwLock::new(self.accepted.read().clone()),
        }
    }
}
