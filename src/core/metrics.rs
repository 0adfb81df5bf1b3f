//! Appender metrics for observability
//!
//! Provides counters for monitoring how events move through the buffer,
//! the publish scheduler and the broker connection.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for appender observability
///
/// # Example
///
/// ```
/// use rust_amqp_appender::AppenderMetrics;
///
/// let metrics = AppenderMetrics::new();
///
/// metrics.record_received();
/// metrics.record_published();
///
/// assert_eq!(metrics.events_received(), 1);
/// assert_eq!(metrics.events_published(), 1);
/// assert_eq!(metrics.pending(), 0);
/// ```
#[derive(Debug)]
pub struct AppenderMetrics {
    /// Events accepted into the buffer
    events_received: AtomicU64,

    /// Events handed to the broker successfully
    events_published: AtomicU64,

    /// Events discarded by a disabled appender
    events_discarded: AtomicU64,

    /// Publishes the broker rejected; the event is dropped
    publish_failures: AtomicU64,

    /// One-shot flush timers armed in batched mode
    timers_armed: AtomicU64,

    /// Flush passes that found the connection ready
    flush_passes: AtomicU64,

    connections_established: AtomicU64,

    connection_failures: AtomicU64,

    disconnects: AtomicU64,
}

impl AppenderMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_discarded: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            timers_armed: AtomicU64::new(0),
            flush_passes: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_discarded(&self) -> u64 {
        self.events_discarded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn timers_armed(&self) -> u64 {
        self.timers_armed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flush_passes(&self) -> u64 {
        self.flush_passes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn connections_established(&self) -> u64 {
        self.connections_established.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn connection_failures(&self) -> u64 {
        self.connection_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Events received but neither published nor failed
    ///
    /// Approximate while other threads are recording.
    pub fn pending(&self) -> u64 {
        self.events_received()
            .saturating_sub(self.events_published() + self.publish_failures())
    }

    #[inline]
    pub fn record_received(&self) -> u64 {
        self.events_received.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_published(&self) -> u64 {
        self.events_published.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_discarded(&self) -> u64 {
        self.events_discarded.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_publish_failure(&self) -> u64 {
        self.publish_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_timer_armed(&self) -> u64 {
        self.timers_armed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_flush_pass(&self) -> u64 {
        self.flush_passes.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_connection_established(&self) -> u64 {
        self.connections_established.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_connection_failure(&self) -> u64 {
        self.connection_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_disconnect(&self) -> u64 {
        self.disconnects.fetch_add(1, Ordering::Relaxed)
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.events_received.store(0, Ordering::Relaxed);
        self.events_published.store(0, Ordering::Relaxed);
        self.events_discarded.store(0, Ordering::Relaxed);
        self.publish_failures.store(0, Ordering::Relaxed);
        self.timers_armed.store(0, Ordering::Relaxed);
        self.flush_passes.store(0, Ordering::Relaxed);
        self.connections_established.store(0, Ordering::Relaxed);
        self.connection_failures.store(0, Ordering::Relaxed);
        self.disconnects.store(0, Ordering::Relaxed);
    }
}

impl Default for AppenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for AppenderMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            events_received: AtomicU64::new(self.events_received()),
            events_published: AtomicU64::new(self.events_published()),
            events_discarded: AtomicU64::new(self.events_discarded()),
            publish_failures: AtomicU64::new(self.publish_failures()),
            timers_armed: AtomicU64::new(self.timers_armed()),
            flush_passes: AtomicU64::new(self.flush_passes()),
            connections_established: AtomicU64::new(self.connections_established()),
            connection_failures: AtomicU64::new(self.connection_failures()),
            disconnects: AtomicU64::new(self.disconnects()),
        }
    }
}
