//! Async hook example
//!
//! Demonstrates batched writes from several producer threads. Records go to
//! an in-memory storage unless `CLICKHOUSE_HOST` is set, in which case they
//! are inserted into `logs.nginx_logs` on that server.
//!
//! Run with: cargo run --example async_hook

use clickhouse_hook::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== ClickHouse Hook - Async Example ===\n");

    let config = ClickHouseConfig::new(
        "logs",
        "nginx_logs",
        vec!["remote_addr".into(), "status".into(), "request_time".into()],
    );

    let memory = Arc::new(MemoryStorage::new());
    let builder = AsyncClickHouseHook::builder(config.clone())
        .max_batch_size(100)
        .flush_interval(Duration::from_millis(500))
        .levels(vec![LogLevel::Info, LogLevel::Warn, LogLevel::Error])
        .diagnostics(Diagnostics::new(Arc::new(ConsoleSink::new()), LogLevel::Debug));

    let builder = match std::env::var("CLICKHOUSE_HOST") {
        Ok(host) => {
            println!("Writing to ClickHouse at {}:8123", host);
            AsyncClickHouseHook::builder(config.with_host(host, 8123))
                .max_batch_size(100)
                .flush_interval(Duration::from_millis(500))
        }
        Err(_) => {
            println!("Writing to in-memory storage");
            builder.storage(memory.clone())
        }
    };

    let hook = Arc::new(builder.build()?);

    println!("\n1. Four threads firing 250 entries each:");
    let handles: Vec<_> = (0..4)
        .map(|thread_id| {
            let hook = Arc::clone(&hook);
            thread::spawn(move || {
                for i in 0..250i64 {
                    let status = if i % 10 == 0 { 500 } else { 200 };
                    let entry = LogEntry::new(LogLevel::Info, "request served")
                        .with_field("remote_addr", format!("10.0.{}.{}", thread_id, i % 255))
                        .with_field("status", status)
                        .with_field("request_time", 0.012 * i as f64);
                    let _ = hook.dispatch(&entry);
                }
            })
        })
        .collect();

    for handle in handles {
        let _ = handle.join();
    }

    println!("\n2. Debug entries are filtered out:");
    hook.dispatch(
        &LogEntry::new(LogLevel::Debug, "noise")
            .with_field("remote_addr", "127.0.0.1")
            .with_field("status", 204)
            .with_field("request_time", 0.0),
    )?;

    hook.flush();
    hook.close();

    let metrics = hook.metrics();
    println!("\nEnqueued:      {}", metrics.records_enqueued());
    println!("Rows written:  {}", metrics.rows_written());
    println!("Batches:       {}", metrics.batches_written());
    println!("Flush cycles:  {}", metrics.flush_cycles());
    println!("Block events:  {}", metrics.block_events());
    println!("In memory:     {}", memory.row_count());

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
