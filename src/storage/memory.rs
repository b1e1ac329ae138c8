//! In-process storage that records every write
//!
//! Used by tests, benchmarks and the demos. Failures can be injected for the
//! liveness probe and for the next N writes; a delay makes writes slow enough
//! to observe backpressure.

use crate::core::{HookError, Result, Row, Storage, TableRef};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// One accepted multi-row write
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenBatch {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug)]
pub struct MemoryStorage {
    writes: Mutex<Vec<WrittenBatch>>,
    reachable: AtomicBool,
    failures_pending: AtomicUsize,
    write_calls: AtomicUsize,
    write_delay: Mutex<Option<Duration>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
            failures_pending: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            write_delay: Mutex::new(None),
        }
    }

    /// Make `ping` succeed or fail
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fail the next `count` non-empty writes
    pub fn fail_next_writes(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Sleep this long inside every non-empty write
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    /// Accepted writes, oldest first
    pub fn writes(&self) -> Vec<WrittenBatch> {
        self.writes.lock().clone()
    }

    /// Every accepted row, in write order
    pub fn rows(&self) -> Vec<Row> {
        self.writes
            .lock()
            .iter()
            .flat_map(|batch| batch.rows.iter().cloned())
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.writes.lock().iter().map(|batch| batch.rows.len()).sum()
    }

    /// Calls to `write`, including empty and failed ones
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.writes.lock().clear();
    }

    fn take_failure(&self) -> bool {
        self.failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn ping(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HookError::connection("memory", "storage unreachable"))
        }
    }

    fn write(&self, table: &TableRef, columns: &[String], rows: &[Row]) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        if rows.is_empty() {
            return Ok(());
        }

        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.take_failure() {
            return Err(HookError::write(table.to_string(), "injected write failure"));
        }

        self.writes.lock().push(WrittenBatch {
            table: table.clone(),
            columns: columns.to_vec(),
            rows: rows.to_vec(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
