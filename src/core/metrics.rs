//! Hook metrics for observability
//!
//! Counters for the ingestion queue and the flush cycle. The async path never
//! reports per-record failures to producers, so these are the way to see what
//! it dropped.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the facade, the writer and the control loop
///
/// # Example
///
/// ```
/// use clickhouse_hook::HookMetrics;
///
/// let metrics = HookMetrics::new();
/// metrics.record_enqueued();
/// metrics.record_rows_written(1);
///
/// assert_eq!(metrics.records_enqueued(), 1);
/// assert_eq!(metrics.rows_written(), 1);
/// ```
#[derive(Debug)]
pub struct HookMetrics {
    /// Records accepted into the ingestion queue
    records_enqueued: AtomicU64,

    /// Records rejected because the engine was closed
    records_dropped: AtomicU64,

    /// Times a producer found the queue full and had to wait
    block_events: AtomicU64,

    /// Flush attempts, including ones with an empty batch
    flush_cycles: AtomicU64,

    /// Successful multi-row writes
    batches_written: AtomicU64,

    rows_written: AtomicU64,

    /// Failed writes; their rows are gone
    write_failures: AtomicU64,

    /// Rows lost to failed writes
    rows_lost: AtomicU64,

    /// Records excluded for missing a column
    malformed_records: AtomicU64,
}

impl HookMetrics {
    pub const fn new() -> Self {
        Self {
            records_enqueued: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            block_events: AtomicU64::new(0),
            flush_cycles: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            rows_lost: AtomicU64::new(0),
            malformed_records: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn records_enqueued(&self) -> u64 {
        self.records_enqueued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn block_events(&self) -> u64 {
        self.block_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flush_cycles(&self) -> u64 {
        self.flush_cycles.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batches_written(&self) -> u64 {
        self.batches_written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rows_lost(&self) -> u64 {
        self.rows_lost.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn malformed_records(&self) -> u64 {
        self.malformed_records.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_enqueued(&self) -> u64 {
        self.records_enqueued.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.records_dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_block(&self) -> u64 {
        self.block_events.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_flush_cycle(&self) -> u64 {
        self.flush_cycles.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a successful write of `rows` rows
    #[inline]
    pub fn record_rows_written(&self, rows: usize) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows as u64, Ordering::Relaxed);
    }

    /// Record a failed write that took `rows` rows with it
    #[inline]
    pub fn record_write_failure(&self, rows: usize) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
        self.rows_lost.fetch_add(rows as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self) -> u64 {
        self.malformed_records.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of written rows among rows that reached a write (0.0 - 100.0)
    ///
    /// Returns 100.0 before anything was attempted.
    pub fn delivery_rate(&self) -> f64 {
        let written = self.rows_written() as f64;
        let total = written + self.rows_lost() as f64;
        if total == 0.0 {
            100.0
        } else {
            (written / total) * 100.0
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.records_enqueued.store(0, Ordering::Relaxed);
        self.records_dropped.store(0, Ordering::Relaxed);
        self.block_events.store(0, Ordering::Relaxed);
        self.flush_cycles.store(0, Ordering::Relaxed);
        self.batches_written.store(0, Ordering::Relaxed);
        self.rows_written.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
        self.rows_lost.store(0, Ordering::Relaxed);
        self.malformed_records.store(0, Ordering::Relaxed);
    }
}

impl Default for HookMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for HookMetrics {
    /// Create a snapshot of the current counter values
    fn clone(&self) -> Self {
        Self {
            records_enqueued: AtomicU64::new(self.records_enqueued()),
            records_dropped: AtomicU64::new(self.records_dropped()),
            block_events: AtomicU64::new(self.block_events()),
            flush_cycles: AtomicU64::new(self.flush_cycles()),
            batches_written: AtomicU64::new(self.batches_written()),
            rows_written: AtomicU64::new(self.rows_written()),
            write_failures: AtomicU64::new(self.write_failures()),
            rows_lost: AtomicU64::new(self.rows_lost()),
            malformed_records: AtomicU64::new(self.malformed_records()),
        }
    }
}
