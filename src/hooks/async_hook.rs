//! Asynchronous hook: entries are queued and written in batches

use crate::core::{
    BatchConfig, BatchingEngine, ClickHouseConfig, Diagnostics, Hook, HookConfig, HookMetrics,
    LevelFilter, LogEntry, LogLevel, Record, Result, Storage, Writer,
};
use crate::storage::ClickHouseStorage;
use std::sync::Arc;
use std::time::Duration;

/// Queues accepted entries and lets a background loop write them in batches
///
/// `fire` never waits on the network; it blocks only while the queue is
/// full, and fails only after close. Write failures are reported through
/// diagnostics and [`HookMetrics`], never to the producer.
pub struct AsyncClickHouseHook {
    engine: BatchingEngine,
    levels: LevelFilter,
}

impl AsyncClickHouseHook {
    /// Hook with default batching, writing to the server named in `config`
    pub fn connect(config: ClickHouseConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Hook built from a loaded configuration file
    pub fn from_config(config: HookConfig) -> Result<Self> {
        Self::builder(config.clickhouse)
            .batch_config(config.batch)
            .build()
    }

    #[must_use]
    pub fn builder(config: ClickHouseConfig) -> AsyncHookBuilder {
        AsyncHookBuilder::new(config)
    }

    /// Queue `record`; blocks while the queue is full
    pub fn enqueue(&self, record: Record) {
        self.engine.enqueue(record);
    }

    /// Write everything enqueued so far and wait for it
    pub fn flush(&self) {
        self.engine.flush();
    }

    /// Final flush and stop; later entries are dropped
    pub fn close(&self) {
        self.engine.close();
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    pub fn set_levels(&self, levels: Vec<LogLevel>) {
        self.levels.set_levels(levels);
    }

    pub fn metrics(&self) -> &HookMetrics {
        self.engine.metrics()
    }

    pub fn batch_config(&self) -> &BatchConfig {
        self.engine.config()
    }
}

impl Hook for AsyncClickHouseHook {
    fn levels(&self) -> Vec<LogLevel> {
        self.levels.levels()
    }

    /// Queue the entry's fields; `EngineClosed` once the hook is closed
    fn fire(&self, entry: &LogEntry) -> Result<()> {
        self.engine.try_enqueue(entry.fields.clone())
    }

    fn name(&self) -> &str {
        "clickhouse-async"
    }

    fn accepts(&self, level: LogLevel) -> bool {
        self.levels.accepts(level)
    }
}

/// Builder for [`AsyncClickHouseHook`]
///
/// # Example
///
/// ```no_run
/// use clickhouse_hook::prelude::*;
/// use std::time::Duration;
///
/// let config = ClickHouseConfig::new("logs", "nginx_logs", vec!["status".into()]);
/// let hook = AsyncClickHouseHook::builder(config)
///     .max_batch_size(10_000)
///     .flush_interval(Duration::from_secs(5))
///     .levels(vec![LogLevel::Warn, LogLevel::Error, LogLevel::Fatal])
///     .build()?;
/// # Ok::<(), clickhouse_hook::HookError>(())
/// ```
pub struct AsyncHookBuilder {
    config: ClickHouseConfig,
    batch: BatchConfig,
    levels: Option<Vec<LogLevel>>,
    storage: Option<Arc<dyn Storage>>,
    diagnostics: Option<Diagnostics>,
}

impl AsyncHookBuilder {
    pub fn new(config: ClickHouseConfig) -> Self {
        Self {
            config,
            batch: BatchConfig::default(),
            levels: None,
            storage: None,
            diagnostics: None,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.batch.queue_capacity = capacity;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.batch.max_batch_size = size;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.batch.flush_interval = interval;
        self
    }

    /// Accepted severities; all of them when not set
    #[must_use = "builder methods return a new value"]
    pub fn levels(mut self, levels: Vec<LogLevel>) -> Self {
        self.levels = Some(levels);
        self
    }

    /// Write somewhere other than the ClickHouse server in the config
    #[must_use = "builder methods return a new value"]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Probe the storage and start the flush loop
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for bad settings, `Connection` when the
    /// storage does not answer its ping. No loop is started in either case.
    pub fn build(self) -> Result<AsyncClickHouseHook> {
        self.batch.validate()?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => Arc::new(ClickHouseStorage::new(&self.config)),
        };
        let diagnostics = self.diagnostics.unwrap_or_default();

        let writer = Writer::open(&self.config, storage, diagnostics, Arc::new(HookMetrics::new()))?;
        let engine = BatchingEngine::start(Arc::new(writer), self.batch)?;

        let levels = match self.levels {
            Some(levels) => LevelFilter::with_levels(levels),
            None => LevelFilter::new(),
        };

        Ok(AsyncClickHouseHook { engine, levels })
    }
}
