//! Basic appender usage example
//!
//! Demonstrates immediate and batched publishing, reconfiguration and
//! shutdown against the in-process broker.
//!
//! Run with: cargo run --example basic_usage

use rust_amqp_appender::broker::MemoryBroker;
use rust_amqp_appender::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Rust AMQP Appender - Basic Usage Example ===\n");

    let broker = MemoryBroker::new();

    // Immediate mode: every event is published as soon as it arrives
    let appender = AmqpAppender::builder(Arc::new(broker.clone()))
        .additional_info("service", json!("orders"))
        .build()?;
    appender.wait_until_ready(Duration::from_secs(5));

    println!("1. Publishing immediately:");
    appender.append(LogEvent::message(LogLevel::Info, "http", "GET /orders"));
    appender.append(
        LogEvent::message(LogLevel::Warn, "http", "slow response: %dms").with_arg(830),
    );
    for message in broker.published() {
        println!("   [{}] {}", message.routing_key, message.text());
    }

    // Batched mode: events wait in the buffer until the send interval elapses
    println!("\n2. Switching to batched mode (sendInterval = 0.2s):");
    appender.reconfigure(AppenderConfig::from_json(
        r#"{ "sendInterval": 0.2, "publish": { "routingKey": "batch" } }"#,
    )?)?;
    appender.wait_until_ready(Duration::from_secs(5));

    for n in 1..=3 {
        appender.append(LogEvent::message(LogLevel::Debug, "worker", format!("job {} done", n)));
    }
    println!("   Buffered before the timer fires: {}", appender.buffered());
    broker.wait_for_published(5, Duration::from_secs(5));
    println!("   Published after the timer fired: {}", broker.published_count());

    // Shutdown publishes whatever is still buffered, then disconnects
    println!("\n3. Shutting down:");
    appender.append(LogEvent::message(LogLevel::Error, "worker", "queue drained"));
    appender.shutdown_with(|| println!("   Shutdown complete"));
    println!("   Total published: {}", broker.published_count());
    println!("   Open connections: {}", broker.open_connections());

    println!("\n=== Example completed successfully! ===");

    Ok(())
}
