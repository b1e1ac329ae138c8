//! Synchronous writer: row building plus one storage write

use super::{
    config::ClickHouseConfig,
    diagnostics::Diagnostics,
    error::{HookError, Result},
    log_level::LogLevel,
    metrics::HookMetrics,
    record::Record,
    row::{build_row, build_rows},
    storage::{Storage, TableRef},
};
use std::sync::Arc;

pub struct Writer {
    storage: Arc<dyn Storage>,
    table: TableRef,
    columns: Arc<[String]>,
    diagnostics: Diagnostics,
    metrics: Arc<HookMetrics>,
}

impl Writer {
    /// Validate `config` and probe `storage`
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for a bad config, `Connection` when the probe
    /// fails.
    pub fn open(
        config: &ClickHouseConfig,
        storage: Arc<dyn Storage>,
        diagnostics: Diagnostics,
        metrics: Arc<HookMetrics>,
    ) -> Result<Self> {
        config.validate()?;

        storage.ping().map_err(|e| match e {
            HookError::Connection { .. } => e,
            other => HookError::connection(config.address(), other.to_string()),
        })?;

        Ok(Self {
            storage,
            table: TableRef::new(config.database.as_str(), config.table.as_str()),
            columns: config.columns.clone().into(),
            diagnostics,
            metrics,
        })
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn metrics(&self) -> &Arc<HookMetrics> {
        &self.metrics
    }

    /// Write one record now
    ///
    /// A record missing a column is returned as `MalformedRecord` and never
    /// reaches storage. Storage errors are returned unchanged.
    pub fn save(&self, record: &Record) -> Result<()> {
        let row = build_row(&self.columns, record).map_err(|e| {
            self.metrics.record_malformed();
            e
        })?;

        match self.storage.write(&self.table, &self.columns, std::slice::from_ref(&row)) {
            Ok(()) => {
                self.metrics.record_rows_written(1);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_write_failure(1);
                Err(e)
            }
        }
    }

    /// Write every well-formed record of `records` in one request
    ///
    /// Malformed records are logged and skipped. Returns the number of rows
    /// written; zero rows means storage was not called.
    pub fn save_batch(&self, records: &[Record]) -> Result<usize> {
        let rows = build_rows(&self.columns, records, |record, err| {
            self.metrics.record_malformed();
            self.diagnostics.log_with_fields(
                LogLevel::Error,
                "Invalid log item",
                Record::new()
                    .with_field("error", err.to_string())
                    .with_field("fields", record.format_fields()),
            );
        });

        if rows.is_empty() {
            return Ok(0);
        }

        self.diagnostics.debug(format!("Exec insert of {} rows", rows.len()));

        match self.storage.write(&self.table, &self.columns, &rows) {
            Ok(()) => {
                self.metrics.record_rows_written(rows.len());
                Ok(rows.len())
            }
            Err(e) => {
                self.metrics.record_write_failure(rows.len());
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("storage", &self.storage.name())
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish()
    }
}
