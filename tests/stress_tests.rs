//! Stress tests for concurrent producers
//!
//! These tests verify:
//! - No event is lost or duplicated under concurrent appends
//! - Each producer's events keep their relative order
//! - Reconfiguring while producers run loses nothing

use rust_amqp_appender::broker::MemoryBroker;
use rust_amqp_appender::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PRODUCERS: usize = 8;
const EVENTS_PER_PRODUCER: usize = 250;
const WAIT: Duration = Duration::from_secs(30);

fn run_producers(appender: &Arc<AmqpAppender>) {
    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let appender = Arc::clone(appender);
            thread::spawn(move || {
                for seq in 0..EVENTS_PER_PRODUCER {
                    appender.append(LogEvent::message(
                        LogLevel::Info,
                        format!("producer-{}", producer),
                        format!("{}:{}", producer, seq),
                    ));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("producer panicked");
    }
}

/// Check every event arrived exactly once and in per-producer order
fn assert_complete_and_ordered(broker: &MemoryBroker) {
    let mut next_seq: HashMap<usize, usize> = HashMap::new();

    for message in broker.published() {
        let payload = message.json().expect("json payload");
        let data = payload["data"].as_str().expect("rendered message");
        let (producer, seq) = data.split_once(':').expect("producer:seq");
        let producer: usize = producer.parse().expect("producer id");
        let seq: usize = seq.parse().expect("sequence number");

        let expected = next_seq.entry(producer).or_insert(0);
        assert_eq!(seq, *expected, "producer {} out of order", producer);
        *expected += 1;
    }

    assert_eq!(next_seq.len(), PRODUCERS);
    assert!(next_seq.values().all(|&n| n == EVENTS_PER_PRODUCER));
}

#[test]
fn test_concurrent_producers_immediate_mode() {
    let broker = MemoryBroker::new();
    let appender = Arc::new(
        AmqpAppender::builder(Arc::new(broker.clone()))
            .build()
            .expect("Failed to create appender"),
    );
    assert!(appender.wait_until_ready(Duration::from_secs(5)));

    run_producers(&appender);

    assert_eq!(broker.published_count(), PRODUCERS * EVENTS_PER_PRODUCER);
    assert_complete_and_ordered(&broker);
    assert_eq!(appender.metrics().pending(), 0);
}

#[test]
fn test_concurrent_producers_batched_mode() {
    let broker = MemoryBroker::new();
    let appender = Arc::new(
        AmqpAppender::builder(Arc::new(broker.clone()))
            .send_interval(Duration::from_millis(20))
            .build()
            .expect("Failed to create appender"),
    );
    assert!(appender.wait_until_ready(Duration::from_secs(5)));

    run_producers(&appender);

    assert!(broker.wait_for_published(PRODUCERS * EVENTS_PER_PRODUCER, WAIT));
    assert_complete_and_ordered(&broker);

    // Every flush pass was started by its own timer
    let metrics = appender.metrics();
    assert!(metrics.flush_passes() <= metrics.timers_armed());
}

#[test]
fn test_concurrent_producers_while_connecting() {
    let broker = MemoryBroker::gated();
    let appender = Arc::new(
        AmqpAppender::builder(Arc::new(broker.clone()))
            .build()
            .expect("Failed to create appender"),
    );

    let opener = {
        let broker = broker.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            broker.open_gate();
        })
    };
    run_producers(&appender);
    opener.join().expect("opener panicked");

    assert!(broker.wait_for_published(PRODUCERS * EVENTS_PER_PRODUCER, WAIT));
    assert_complete_and_ordered(&broker);
}

#[test]
fn test_reconfigure_under_load_loses_nothing() {
    let broker = MemoryBroker::new();
    let appender = Arc::new(
        AmqpAppender::builder(Arc::new(broker.clone()))
            .build()
            .expect("Failed to create appender"),
    );

    let reconfigurer = {
        let appender = Arc::clone(&appender);
        thread::spawn(move || {
            for _ in 0..5 {
                appender
                    .reconfigure(AppenderConfig::default())
                    .expect("Failed to reconfigure");
                thread::sleep(Duration::from_millis(2));
            }
        })
    };
    run_producers(&appender);
    reconfigurer.join().expect("reconfigurer panicked");

    assert!(broker.wait_for_published(PRODUCERS * EVENTS_PER_PRODUCER, WAIT));
    assert_complete_and_ordered(&broker);
    assert_eq!(appender.metrics().publish_failures(), 0);
}
