//! Batching engine: bounded queue, single control loop, three flush triggers
//!
//! Producers put records on a bounded channel and block only when it is full.
//! One worker thread owns the in-memory batch. On each iteration it first
//! takes whatever is already queued without blocking, and only when the
//! queue is empty does it wait on the queue, the ticker, a flush request and
//! a halt request together. A batch reaching `max_batch_size` is written at
//! once; otherwise it waits for the ticker, an explicit flush or shutdown.
//!
//! Writes happen on the worker thread. A slow write stalls the loop: the queue
//! fills up and producers start blocking. Write failures are logged and the
//! batch is dropped; nothing is retried.

use super::{
    config::BatchConfig,
    error::{HookError, Result},
    log_level::LogLevel,
    metrics::HookMetrics,
    record::Record,
    writer::Writer,
};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Why a flush cycle ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Batch reached `max_batch_size`
    Threshold,
    /// Periodic ticker fired
    Timer,
    /// A caller asked through [`BatchingEngine::flush`]
    Explicit,
    /// Final flush before the loop exits
    Halt,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushTrigger::Threshold => write!(f, "threshold"),
            FlushTrigger::Timer => write!(f, "ticker"),
            FlushTrigger::Explicit => write!(f, "flush"),
            FlushTrigger::Halt => write!(f, "halt"),
        }
    }
}

pub struct BatchingEngine {
    queue: Sender<Record>,
    flush_requests: Sender<Sender<()>>,
    halt: Sender<()>,
    /// Disconnects when the control loop returns
    stopped: Receiver<()>,
    /// One explicit flush in flight at a time
    flush_lock: Mutex<()>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    /// Held shared by producers from the closed check through the send
    gate: RwLock<()>,
    closed: AtomicBool,
    writer: Arc<Writer>,
    config: BatchConfig,
}

impl BatchingEngine {
    /// Spawn the control loop writing through `writer`
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for a bad `config`, `IoError` if the worker
    /// thread cannot be spawned.
    pub fn start(writer: Arc<Writer>, config: BatchConfig) -> Result<Self> {
        config.validate()?;

        let (queue, records) = bounded(config.queue_capacity);
        let (flush_requests, flush_rx) = bounded(1);
        let (halt, halt_rx) = bounded(1);
        let (stopped_tx, stopped) = bounded(0);

        let control = ControlLoop {
            records,
            flush_requests: flush_rx,
            halt: halt_rx,
            ticker: tick(config.flush_interval),
            stopped: stopped_tx,
            batch: Batch::new(Arc::clone(&writer), config.max_batch_size),
        };

        let handle = thread::Builder::new()
            .name("clickhouse-hook-flush".to_string())
            .spawn(move || control.run())?;

        Ok(Self {
            queue,
            flush_requests,
            halt,
            stopped,
            flush_lock: Mutex::new(()),
            worker: Mutex::new(Some(handle)),
            gate: RwLock::new(()),
            closed: AtomicBool::new(false),
            writer,
            config,
        })
    }

    /// Queue `record` for the next flush
    ///
    /// Blocks while the queue is full. After [`close`](Self::close) has
    /// begun the record is dropped and counted instead.
    pub fn enqueue(&self, record: Record) {
        let _ = self.try_enqueue(record);
    }

    /// [`enqueue`](Self::enqueue), reporting a dropped record as
    /// `EngineClosed`
    ///
    /// A record accepted here is written by a later flush cycle, at the
    /// latest the final one run by `close`.
    pub fn try_enqueue(&self, record: Record) -> Result<()> {
        let metrics = self.metrics();
        let _gate = self.gate.read();

        if self.closed.load(Ordering::Acquire) {
            return Err(self.reject("engine closed"));
        }

        match self.queue.try_send(record) {
            Ok(()) => {
                metrics.record_enqueued();
                Ok(())
            }
            Err(TrySendError::Full(record)) => {
                // Backpressure: wait for the loop to free a slot
                metrics.record_block();
                match self.queue.send(record) {
                    Ok(()) => {
                        metrics.record_enqueued();
                        Ok(())
                    }
                    Err(_) => Err(self.reject("flush loop stopped")),
                }
            }
            Err(TrySendError::Disconnected(_)) => Err(self.reject("flush loop stopped")),
        }
    }

    fn reject(&self, reason: &str) -> HookError {
        let dropped = self.metrics().record_dropped() + 1;
        self.writer.diagnostics().log_with_fields(
            LogLevel::Warn,
            "Record dropped",
            Record::new()
                .with_field("reason", reason)
                .with_field("dropped_total", dropped as i64),
        );
        HookError::EngineClosed
    }

    /// Run one flush cycle and wait for it to finish
    ///
    /// The cycle covers every record whose `enqueue` returned before this
    /// call. Concurrent callers are served one after another. Returns at once
    /// after close.
    pub fn flush(&self) {
        let _serialized = self.flush_lock.lock();

        if self.closed.load(Ordering::Acquire) {
            return;
        }

        self.writer.diagnostics().debug("Flush...");

        let (ack, done) = bounded(1);
        if self.flush_requests.send(ack).is_err() {
            return;
        }
        // The loop may exit with this request still queued
        select! {
            recv(done) -> _ => {}
            recv(self.stopped) -> _ => {}
        }
    }

    /// Final flush and stop
    ///
    /// Blocks until the loop has drained the queue, written the last batch
    /// and exited. Later calls return once that has happened.
    pub fn close(&self) {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };

        {
            // Waits out producers that passed the closed check; the loop
            // keeps draining so a blocked send still completes
            let _gate = self.gate.write();
            self.closed.store(true, Ordering::Release);
        }
        self.writer.diagnostics().debug("Close...");

        // Fails only if the loop is already gone
        let _ = self.halt.send(());

        if handle.join().is_err() {
            self.writer
                .diagnostics()
                .error("Flush thread panicked; buffered records were lost");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Records waiting in the queue, not yet in the batch
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn metrics(&self) -> &HookMetrics {
        self.writer.metrics()
    }

    pub fn writer(&self) -> &Arc<Writer> {
        &self.writer
    }
}

impl Drop for BatchingEngine {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for BatchingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchingEngine")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .field("queued", &self.queued())
            .finish()
    }
}

/// State owned by the worker thread
struct ControlLoop {
    records: Receiver<Record>,
    flush_requests: Receiver<Sender<()>>,
    halt: Receiver<()>,
    ticker: Receiver<Instant>,
    stopped: Sender<()>,
    batch: Batch,
}

impl ControlLoop {
    fn run(self) {
        let ControlLoop {
            records,
            flush_requests,
            halt,
            ticker,
            stopped: _stopped,
            mut batch,
        } = self;

        loop {
            // Eager drain: never block while records are already waiting
            match records.try_recv() {
                Ok(record) => {
                    batch.push(record);
                    continue;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    batch.flush(FlushTrigger::Halt);
                    return;
                }
            }

            select! {
                recv(records) -> msg => match msg {
                    Ok(record) => batch.push(record),
                    Err(_) => {
                        batch.flush(FlushTrigger::Halt);
                        return;
                    }
                },
                recv(ticker) -> _ => batch.flush(FlushTrigger::Timer),
                recv(flush_requests) -> msg => match msg {
                    Ok(ack) => {
                        // Everything enqueued before the request is already queued
                        batch.take_queued(&records, records.len());
                        batch.flush(FlushTrigger::Explicit);
                        let _ = ack.send(());
                    }
                    Err(_) => {
                        batch.drain_and_flush(&records);
                        return;
                    }
                },
                recv(halt) -> _ => {
                    batch.writer.diagnostics().debug("Halt...");
                    batch.drain_and_flush(&records);
                    return;
                }
            }
        }
    }
}

/// Records accumulated since the last flush
struct Batch {
    records: Vec<Record>,
    max_size: usize,
    writer: Arc<Writer>,
}

impl Batch {
    fn new(writer: Arc<Writer>, max_size: usize) -> Self {
        Self {
            records: Vec::with_capacity(max_size.min(1024)),
            max_size,
            writer,
        }
    }

    fn push(&mut self, record: Record) {
        self.records.push(record);
        if self.records.len() >= self.max_size {
            self.flush(FlushTrigger::Threshold);
        }
    }

    /// Move at most `limit` queued records into the batch
    fn take_queued(&mut self, records: &Receiver<Record>, limit: usize) {
        for _ in 0..limit {
            match records.try_recv() {
                Ok(record) => self.push(record),
                Err(_) => break,
            }
        }
    }

    /// Move everything still queued into batches, then flush the rest
    fn drain_and_flush(&mut self, records: &Receiver<Record>) {
        while let Ok(record) = records.try_recv() {
            self.push(record);
        }
        self.flush(FlushTrigger::Halt);
    }

    fn flush(&mut self, trigger: FlushTrigger) {
        let metrics = self.writer.metrics();
        let diagnostics = self.writer.diagnostics();

        metrics.record_flush_cycle();
        diagnostics.debug(format!("Flush by {}...", trigger));

        if self.records.is_empty() {
            return;
        }

        let writer = &self.writer;
        let records = &self.records;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            writer.save_batch(records)
        }));

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                diagnostics.log_with_fields(
                    LogLevel::Error,
                    "Failed to write batch",
                    Record::new()
                        .with_field("error", e.to_string())
                        .with_field("records", records.len() as i64)
                        .with_field("trigger", trigger.to_string()),
                );
            }
            Err(panic_info) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                metrics.record_write_failure(records.len());
                diagnostics.log_with_fields(
                    LogLevel::Error,
                    "Storage panicked during write",
                    Record::new()
                        .with_field("panic", panic_msg)
                        .with_field("records", records.len() as i64),
                );
            }
        }

        // Cleared whatever the outcome; failed batches are not retried
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClickHouseConfig, Diagnostics, FieldValue};
    use crate::sinks::MemorySink;
    use crate::storage::MemoryStorage;
    use std::time::Duration;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        sink: Arc<MemorySink>,
        engine: BatchingEngine,
    }

    fn fixture(queue_capacity: usize, max_batch_size: usize, flush_interval: Duration) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let sink = Arc::new(MemorySink::new());
        let writer = Writer::open(
            &ClickHouseConfig::new("logs", "events", vec!["n".to_string()]),
            storage.clone(),
            Diagnostics::new(sink.clone(), LogLevel::Trace),
            Arc::new(HookMetrics::new()),
        )
        .unwrap();

        let engine = BatchingEngine::start(
            Arc::new(writer),
            BatchConfig {
                queue_capacity,
                max_batch_size,
                flush_interval,
            },
        )
        .unwrap();

        Fixture {
            storage,
            sink,
            engine,
        }
    }

    fn record(n: i64) -> Record {
        Record::new().with_field("n", n)
    }

    fn values(storage: &MemoryStorage) -> Vec<i64> {
        storage
            .rows()
            .iter()
            .map(|row| match row.values()[0] {
                FieldValue::Int(n) => n,
                ref other => panic!("unexpected value {:?}", other),
            })
            .collect()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    const LONG: Duration = Duration::from_secs(3600);

    #[test]
    fn test_start_rejects_invalid_config() {
        let writer = Writer::open(
            &ClickHouseConfig::new("logs", "events", vec!["n".to_string()]),
            Arc::new(MemoryStorage::new()),
            Diagnostics::new(Arc::new(MemorySink::new()), LogLevel::Error),
            Arc::new(HookMetrics::new()),
        )
        .unwrap();

        let result = BatchingEngine::start(
            Arc::new(writer),
            BatchConfig {
                max_batch_size: 0,
                ..BatchConfig::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_threshold_flush_then_close_flushes_rest() {
        let f = fixture(3, 3, LONG);

        for n in 1..=5 {
            f.engine.enqueue(record(n));
        }

        assert!(wait_until(|| f.storage.writes().len() == 1));
        assert_eq!(values(&f.storage), vec![1, 2, 3]);

        f.engine.close();
        let writes = f.storage.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(values(&f.storage), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_explicit_flush_writes_buffered_records() {
        let f = fixture(16, 100, LONG);

        f.engine.enqueue(record(1));
        f.engine.enqueue(record(2));

        f.engine.flush();
        assert_eq!(values(&f.storage), vec![1, 2]);
        assert_eq!(f.engine.metrics().flush_cycles(), 1);
    }

    #[test]
    fn test_repeated_flush_without_records_is_noop() {
        let f = fixture(16, 100, LONG);

        f.engine.flush();
        f.engine.flush();

        assert_eq!(f.engine.metrics().flush_cycles(), 2);
        assert_eq!(f.storage.write_calls(), 0);
    }

    #[test]
    fn test_timer_ticks_without_records_write_nothing() {
        let f = fixture(16, 100, Duration::from_millis(10));

        assert!(wait_until(|| f.engine.metrics().flush_cycles() >= 3));
        assert_eq!(f.storage.write_calls(), 0);

        f.engine.enqueue(record(7));
        assert!(wait_until(|| f.storage.row_count() == 1));
        assert_eq!(values(&f.storage), vec![7]);
    }

    #[test]
    fn test_failed_write_clears_batch_and_engine_recovers() {
        let f = fixture(16, 100, LONG);
        f.storage.fail_next_writes(1);

        f.engine.enqueue(record(1));
        f.engine.flush();

        assert!(f.storage.writes().is_empty());
        assert_eq!(f.engine.metrics().write_failures(), 1);
        assert!(f.sink.contains("Failed to write batch"));

        f.engine.enqueue(record(2));
        f.engine.flush();

        assert_eq!(values(&f.storage), vec![2]);
    }

    #[test]
    fn test_close_without_records() {
        let f = fixture(16, 100, LONG);

        let started = Instant::now();
        f.engine.close();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(f.engine.metrics().flush_cycles(), 1);
        assert_eq!(f.storage.write_calls(), 0);
        assert!(f.engine.is_closed());
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_later_records() {
        let f = fixture(16, 100, LONG);

        f.engine.close();
        f.engine.close();
        f.engine.enqueue(record(1));
        f.engine.flush();

        assert_eq!(f.engine.metrics().records_dropped(), 1);
        assert_eq!(f.engine.metrics().flush_cycles(), 1);
        assert!(f.sink.contains("Record dropped"));
    }

    #[test]
    fn test_try_enqueue_after_close_reports_engine_closed() {
        let f = fixture(16, 100, LONG);

        assert!(f.engine.try_enqueue(record(1)).is_ok());
        f.engine.close();

        let err = f.engine.try_enqueue(record(2)).unwrap_err();
        assert!(matches!(err, HookError::EngineClosed));
        assert_eq!(values(&f.storage), vec![1]);
        assert_eq!(f.engine.metrics().records_dropped(), 1);
    }

    #[test]
    fn test_close_with_blocked_producers_writes_every_accepted_record() {
        let f = Arc::new(fixture(2, 4, LONG));
        f.storage.set_write_delay(Some(Duration::from_millis(5)));

        let producers: Vec<_> = (0..4i64)
            .map(|t| {
                let f = Arc::clone(&f);
                thread::spawn(move || {
                    let mut accepted = Vec::new();
                    for n in 0..200 {
                        let value = t * 1000 + n;
                        if f.engine.try_enqueue(record(value)).is_ok() {
                            accepted.push(value);
                        }
                    }
                    accepted
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        f.engine.close();

        let mut accepted: Vec<i64> = producers
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        accepted.sort_unstable();
        let mut written = values(&f.storage);
        written.sort_unstable();

        assert_eq!(written, accepted);
        let metrics = f.engine.metrics();
        assert_eq!(metrics.records_enqueued(), metrics.rows_written());
        assert_eq!(metrics.records_enqueued() + metrics.records_dropped(), 800);
        assert!(metrics.records_dropped() > 0);
    }

    #[test]
    fn test_close_drains_queue() {
        let f = fixture(64, 1000, LONG);
        f.storage.set_write_delay(Some(Duration::from_millis(20)));

        for n in 0..50 {
            f.engine.enqueue(record(n));
        }
        f.engine.close();

        assert_eq!(values(&f.storage), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_drop_closes_engine() {
        let f = fixture(16, 100, LONG);
        let storage = Arc::clone(&f.storage);

        f.engine.enqueue(record(1));
        drop(f);

        assert_eq!(values(&storage), vec![1]);
    }

    #[test]
    fn test_concurrent_flush_calls_all_return() {
        let f = Arc::new(fixture(1024, 10_000, LONG));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let f = Arc::clone(&f);
                thread::spawn(move || {
                    for n in 0..10 {
                        f.engine.enqueue(record(t * 100 + n));
                        f.engine.flush();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(f.engine.metrics().flush_cycles(), 80);
        assert_eq!(f.storage.row_count(), 80);

        f.engine.close();
        assert_eq!(f.engine.metrics().flush_cycles(), 81);
    }
}
