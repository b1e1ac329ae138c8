//! Storage implementations

pub mod clickhouse;
pub mod memory;

pub use clickhouse::ClickHouseStorage;
pub use memory::{MemoryStorage, WrittenBatch};

pub use crate::core::{Storage, TableRef};
