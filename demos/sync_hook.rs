//! Sync hook example
//!
//! Each record is written on the calling thread and errors come back to the
//! caller.
//!
//! Run with: cargo run --example sync_hook

use clickhouse_hook::prelude::*;
use std::sync::Arc;

fn main() -> Result<()> {
    println!("=== ClickHouse Hook - Sync Example ===\n");

    let config = ClickHouseConfig::new("logs", "audit", vec!["user".into(), "action".into()]);
    let storage = Arc::new(MemoryStorage::new());
    let hook = ClickHouseHook::new(config, storage.clone(), Diagnostics::stderr())?;

    println!("1. Saving well-formed records:");
    for (user, action) in [("alice", "login"), ("bob", "delete"), ("alice", "logout")] {
        hook.save(&Record::new().with_field("user", user).with_field("action", action))?;
        println!("   saved {} {}", user, action);
    }

    println!("\n2. A record missing a column is rejected:");
    match hook.save(&Record::new().with_field("user", "mallory")) {
        Ok(()) => println!("   unexpectedly saved"),
        Err(e) => println!("   {}", e),
    }

    println!("\n3. A failing write is reported to the caller:");
    storage.fail_next_writes(1);
    if let Err(e) = hook.save(&Record::new().with_field("user", "carol").with_field("action", "login")) {
        println!("   {}", e);
    }

    println!("\nRows stored: {}", storage.row_count());
    println!("Delivery rate: {:.1}%", hook.metrics().delivery_rate());

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
