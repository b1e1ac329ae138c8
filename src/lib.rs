//! # ClickHouse Hook
//!
//! A logging hook that ships structured log records to a ClickHouse table.
//!
//! ## Features
//!
//! - **Batching**: Records are queued and written as multi-row inserts
//! - **Three flush triggers**: Batch size threshold, periodic timer, explicit flush
//! - **Backpressure**: Producers block while the bounded queue is full, nothing is dropped
//! - **Clean shutdown**: `close` drains the queue and performs a final flush
//! - **Sync mode**: One write per record when batching is not wanted

pub mod core;
pub mod hooks;
pub mod sinks;
pub mod storage;

pub mod prelude {
    pub use crate::core::{
        BatchConfig, ClickHouseConfig, Credentials, Diagnostics, FieldValue, Hook, HookConfig,
        HookError, HookMetrics, LevelFilter, LogEntry, LogLevel, Record, Result, Storage,
    };
    pub use crate::hooks::{AsyncClickHouseHook, AsyncHookBuilder, ClickHouseHook};
    pub use crate::sinks::{ConsoleSink, MemorySink};
    pub use crate::storage::{ClickHouseStorage, MemoryStorage};
}

pub use crate::core::{
    BatchConfig, ClickHouseConfig, Credentials, DiagnosticSink, Diagnostics, FieldValue, Hook,
    HookConfig, HookError, HookMetrics, LevelFilter, LogEntry, LogLevel, Record, Result, Row,
    Storage, TableRef, DEFAULT_BUFFER_SIZE, DEFAULT_FLUSH_INTERVAL,
};
pub use hooks::{AsyncClickHouseHook, AsyncHookBuilder, ClickHouseHook};
pub use storage::{ClickHouseStorage, MemoryStorage};
