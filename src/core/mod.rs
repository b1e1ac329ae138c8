//! Core hook types and traits

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod hook;
pub mod log_entry;
pub mod log_level;
pub mod metrics;
pub mod record;
pub mod row;
pub mod storage;
pub mod writer;

pub use config::{
    BatchConfig, ClickHouseConfig, Credentials, HookConfig, DEFAULT_BUFFER_SIZE,
    DEFAULT_FLUSH_INTERVAL, DEFAULT_TIMEOUT,
};
pub use diagnostics::{DiagnosticSink, Diagnostics};
pub use engine::{BatchingEngine, FlushTrigger};
pub use error::{HookError, Result};
pub use hook::Hook;
pub use log_entry::LogEntry;
pub use log_level::{LevelFilter, LogLevel};
pub use metrics::HookMetrics;
pub use record::{FieldValue, Record};
pub use row::{build_row, build_rows, Row};
pub use storage::{Storage, TableRef};
pub use writer::Writer;
