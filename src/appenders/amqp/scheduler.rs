//! Decides when buffered events are published
//!
//! With a zero send interval every event is flushed as soon as it is
//! buffered. With a positive interval the first event of a quiet period
//! arms a one-shot timer and everything buffered until it fires goes out in
//! a single pass.

use super::context::{AppenderContext, Mode};
use super::dispatcher::Signal;
use crate::core::{LogEvent, PendingEvent};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Handle of the single pending flush timer
#[derive(Debug, Default)]
pub(crate) struct SendTimer {
    armed_at: Option<Instant>,
}

impl SendTimer {
    pub(crate) fn is_pending(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Returns `false` without changing anything when a timer is pending
    fn arm(&mut self) -> bool {
        if self.armed_at.is_some() {
            return false;
        }
        self.armed_at = Some(Instant::now());
        true
    }

    pub(super) fn clear(&mut self) -> Option<Duration> {
        self.armed_at.take().map(|at| at.elapsed())
    }
}

impl AppenderContext {
    pub(crate) fn on_event(&mut self, event: LogEvent) {
        if self.mode == Mode::Disabled {
            self.metrics.record_discarded();
            return;
        }

        let event = PendingEvent::normalize(event, &self.options.layout);
        self.buffer.append(event);
        self.metrics.record_received();

        if self.options.is_batched() {
            self.schedule_flush();
        } else {
            self.flush();
        }
    }

    fn schedule_flush(&mut self) {
        if !self.timer.arm() {
            return;
        }

        let interval = self.options.send_interval;
        if self.signals.send(Signal::ArmTimer { interval }).is_err() {
            // No dispatcher to fire it; leave the events for the next flush.
            self.timer.clear();
            return;
        }
        self.metrics.record_timer_armed();
    }

    pub(crate) fn on_timer_fired(&mut self) {
        if let Some(waited) = self.timer.clear() {
            debug!(
                waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                buffered = self.buffer.len(),
                "send timer fired"
            );
        }
        self.flush();
    }

    /// Publish buffered events, oldest first, while the connection is ready
    ///
    /// Does nothing when the connection is not ready. Only events still in
    /// the buffer are taken, so overlapping triggers never publish twice.
    pub(crate) fn flush(&mut self) {
        if !self.connection.is_ready() || self.buffer.is_empty() {
            return;
        }
        self.metrics.record_flush_pass();

        let options = &self.options;
        let mut pending = self.buffer.drain_all();
        while self.connection.is_ready() {
            let Some(event) = pending.next() else {
                break;
            };

            let payload = options.intercept(&event);
            match self
                .connection
                .publish(&options.publish.routing_key, &payload, &options.publish)
            {
                Ok(()) => {
                    self.metrics.record_published();
                }
                Err(error) => {
                    self.metrics.record_publish_failure();
                    warn!(%error, category = %event.category, "dropping event after failed publish");
                }
            }
        }
    }
}
