//! Per-appender state shared by the producer side and the dispatcher
//!
//! One `AppenderContext` exists per [`AmqpAppender`](super::AmqpAppender)
//! and is only ever touched under its mutex. The scheduler and lifecycle
//! operations are implemented on it in their own modules.

use super::buffer::EventBuffer;
use super::config::AppenderOptions;
use super::connection::{ConnectionManager, ConnectionState};
use super::dispatcher::Signal;
use super::scheduler::SendTimer;
use crate::broker::BrokerClient;
use crate::core::{AppenderError, AppenderMetrics, Result};
use crossbeam_channel::Sender;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Active,
    /// Accepts and discards events; never leaves this mode
    Disabled,
}

pub(crate) struct AppenderContext {
    pub(super) options: Arc<AppenderOptions>,
    pub(super) buffer: EventBuffer,
    pub(super) timer: SendTimer,
    pub(super) connection: ConnectionManager,
    pub(super) metrics: Arc<AppenderMetrics>,
    pub(super) signals: Sender<Signal>,
    pub(super) mode: Mode,
}

impl AppenderContext {
    pub(crate) fn new(
        client: Arc<dyn BrokerClient>,
        options: AppenderOptions,
        signals: Sender<Signal>,
        metrics: Arc<AppenderMetrics>,
    ) -> Self {
        Self {
            options: Arc::new(options),
            buffer: EventBuffer::new(),
            timer: SendTimer::default(),
            connection: ConnectionManager::new(client, signals.clone(), Arc::clone(&metrics)),
            metrics,
            signals,
            mode: Mode::Active,
        }
    }

    /// Swap in new options and replace the connection
    ///
    /// Buffered events are kept and published once the new connection is
    /// ready.
    pub(crate) fn configure(&mut self, options: AppenderOptions) -> Result<()> {
        if self.mode == Mode::Disabled {
            return Err(AppenderError::config(
                "appender",
                "a disabled appender cannot be reconfigured",
            ));
        }

        info!(
            url = %options.connection.redacted_url(),
            exchange = %options.exchange.name,
            exchange_type = %options.exchange.kind,
            routing_key = %options.publish.routing_key,
            queue = options.queue.as_ref().map(|q| q.name.as_str()),
            send_interval_ms = u64::try_from(options.send_interval.as_millis()).unwrap_or(u64::MAX),
            buffered = self.buffer.len(),
            "configuring amqp appender"
        );

        self.options = Arc::new(options);
        // The new connection flushes on readiness; the next event arms a
        // timer with the new interval.
        self.timer.clear();
        let options = Arc::clone(&self.options);
        self.connection.configure(
            &options.connection,
            &options.exchange,
            options.queue.as_ref(),
            &options.publish.routing_key,
        )
    }

    /// Tear down the connection and stop accepting events for good
    pub(crate) fn disable(&mut self) {
        if self.mode == Mode::Disabled {
            return;
        }
        info!(
            discarded = self.buffer.len(),
            "disabling amqp appender, events will be discarded"
        );
        self.connection.disconnect();
        self.mode = Mode::Disabled;
    }

    pub(crate) fn on_connection_ready(&mut self, generation: u64) {
        if self.connection.on_ready(generation) {
            // Everything that piled up while connecting goes out now.
            self.flush();
        }
    }

    pub(crate) fn on_connection_failed(&mut self, generation: u64, error: AppenderError) {
        self.connection.on_failed(generation, error);
        if !self.buffer.is_empty() && !self.connection.is_ready() {
            warn!(
                buffered = self.buffer.len(),
                "events stay buffered until the appender is reconfigured"
            );
        }
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub(crate) fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn timer_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.mode == Mode::Disabled
    }
}
