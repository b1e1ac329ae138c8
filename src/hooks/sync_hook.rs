//! Synchronous hook: one write per record

use crate::core::{
    ClickHouseConfig, Diagnostics, Hook, HookMetrics, LevelFilter, LogEntry, LogLevel, Record,
    Result, Storage, Writer,
};
use crate::storage::ClickHouseStorage;
use std::sync::Arc;

/// Writes each accepted entry immediately, on the caller's thread
///
/// # Example
///
/// ```no_run
/// use clickhouse_hook::prelude::*;
///
/// let config = ClickHouseConfig::new("logs", "nginx_logs", vec!["status".into()])
///     .with_host("clickhouse-server", 8123);
/// let hook = ClickHouseHook::connect(config)?;
///
/// hook.save(&Record::new().with_field("status", "200"))?;
/// # Ok::<(), clickhouse_hook::HookError>(())
/// ```
pub struct ClickHouseHook {
    writer: Writer,
    levels: LevelFilter,
}

impl ClickHouseHook {
    /// Hook writing to the ClickHouse server named in `config`
    pub fn connect(config: ClickHouseConfig) -> Result<Self> {
        let storage = Arc::new(ClickHouseStorage::new(&config));
        Self::new(config, storage, Diagnostics::stderr())
    }

    /// Hook writing to `storage`; fails if the storage does not answer a ping
    pub fn new(
        config: ClickHouseConfig,
        storage: Arc<dyn Storage>,
        diagnostics: Diagnostics,
    ) -> Result<Self> {
        let writer = Writer::open(&config, storage, diagnostics, Arc::new(HookMetrics::new()))?;
        Ok(Self {
            writer,
            levels: LevelFilter::new(),
        })
    }

    /// Write `record` now; storage errors come back unchanged
    pub fn save(&self, record: &Record) -> Result<()> {
        self.writer.save(record)
    }

    pub fn set_levels(&self, levels: Vec<LogLevel>) {
        self.levels.set_levels(levels);
    }

    pub fn metrics(&self) -> &HookMetrics {
        self.writer.metrics()
    }

    pub fn columns(&self) -> &[String] {
        self.writer.columns()
    }
}

impl Hook for ClickHouseHook {
    fn levels(&self) -> Vec<LogLevel> {
        self.levels.levels()
    }

    fn fire(&self, entry: &LogEntry) -> Result<()> {
        self.save(&entry.fields)
    }

    fn name(&self) -> &str {
        "clickhouse"
    }

    fn accepts(&self, level: LogLevel) -> bool {
        self.levels.accepts(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HookError;
    use crate::sinks::MemorySink;
    use crate::storage::MemoryStorage;

    fn hook(storage: Arc<MemoryStorage>) -> ClickHouseHook {
        ClickHouseHook::new(
            ClickHouseConfig::new("logs", "nginx_logs", vec!["status".into()]),
            storage,
            Diagnostics::new(Arc::new(MemorySink::new()), LogLevel::Error),
        )
        .unwrap()
    }

    #[test]
    fn test_connection_error_on_construction() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_reachable(false);

        let result = ClickHouseHook::new(
            ClickHouseConfig::new("logs", "nginx_logs", vec!["status".into()]),
            storage,
            Diagnostics::new(Arc::new(MemorySink::new()), LogLevel::Error),
        );
        assert!(matches!(result, Err(HookError::Connection { .. })));
    }

    #[test]
    fn test_fire_writes_entry_fields() {
        let storage = Arc::new(MemoryStorage::new());
        let hook = hook(storage.clone());

        let entry = LogEntry::new(LogLevel::Info, "request").with_field("status", "200");
        hook.fire(&entry).unwrap();

        assert_eq!(storage.row_count(), 1);
        assert_eq!(hook.metrics().rows_written(), 1);
    }

    #[test]
    fn test_dispatch_respects_levels() {
        let storage = Arc::new(MemoryStorage::new());
        let hook = hook(storage.clone());
        hook.set_levels(vec![LogLevel::Error]);

        hook.dispatch(&LogEntry::new(LogLevel::Info, "skip").with_field("status", "200"))
            .unwrap();
        hook.dispatch(&LogEntry::new(LogLevel::Error, "keep").with_field("status", "500"))
            .unwrap();

        assert_eq!(storage.row_count(), 1);
        assert_eq!(hook.levels(), vec![LogLevel::Error]);
    }

    #[test]
    fn test_save_propagates_write_error() {
        let storage = Arc::new(MemoryStorage::new());
        let hook = hook(storage.clone());
        storage.fail_next_writes(1);

        let err = hook.save(&Record::new().with_field("status", "200")).unwrap_err();
        assert!(err.is_write());

        hook.save(&Record::new().with_field("status", "200")).unwrap();
        assert_eq!(storage.row_count(), 1);
    }
}
