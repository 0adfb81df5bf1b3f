//! Broker connection lifecycle
//!
//! The manager owns at most one live connection. `configure` tears the
//! previous one down, then opens the new one on a background thread that
//! connects, declares the exchange and, when configured, declares and binds
//! the queue.
//!
//! Attempts are numbered by configuration generation. A new attempt waits
//! for the one it replaces to finish, and an attempt that finds itself
//! superseded closes its own connection before declaring anything, so two
//! connections are never live at once. A finished connection is parked in
//! the shared [`Attempts`] slot and the dispatcher is notified with
//! [`Signal::Ready`](super::dispatcher::Signal::Ready).

use super::dispatcher::Signal;
use crate::broker::{
    BrokerClient, BrokerConnection, ConnectionOptions, ExchangeOptions, Message, PublishOptions,
    QueueOptions,
};
use crate::core::{AppenderError, AppenderMetrics, Result};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never configured
    Absent,
    /// Establishing on a background thread
    Connecting,
    /// Exchange (and queue binding) in place; publishes go through
    Ready,
    /// Torn down, failed to establish, or dropped by the broker
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Absent => "absent",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// An open connection together with the exchange declared on it
///
/// Dropping the handle disconnects.
pub struct ExchangeHandle {
    connection: Box<dyn BrokerConnection>,
    exchange: String,
}

impl ExchangeHandle {
    fn close(self) {
        drop(self);
    }
}

impl Drop for ExchangeHandle {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

/// Shared between the manager and its connect threads
#[derive(Default)]
struct Attempts {
    /// Generation of the newest configuration
    current: u64,
    /// Connection finished by the current attempt, not yet installed
    ready: Option<ExchangeHandle>,
}

/// Everything the background thread needs to bring a connection up
struct ConnectPlan {
    connection: ConnectionOptions,
    exchange: ExchangeOptions,
    queue: Option<QueueOptions>,
    routing_key: String,
}

/// Connect and declare; `Ok(None)` when superseded right after connecting
fn establish<F>(client: &dyn BrokerClient, plan: &ConnectPlan, superseded: F) -> Result<Option<ExchangeHandle>>
where
    F: Fn() -> bool,
{
    let connection = client.connect(&plan.connection)?;
    let mut handle = ExchangeHandle {
        connection,
        exchange: plan.exchange.name.clone(),
    };
    if superseded() {
        handle.close();
        return Ok(None);
    }

    handle.connection.declare_exchange(&plan.exchange)?;
    if let Some(queue) = &plan.queue {
        handle.connection.declare_queue(queue)?;
        handle
            .connection
            .bind_queue(&queue.name, &plan.exchange.name, &plan.routing_key)?;
    }
    Ok(Some(handle))
}

/// Body of one `amqp-connect-N` thread
fn run_attempt(
    client: Arc<dyn BrokerClient>,
    plan: ConnectPlan,
    generation: u64,
    previous: Option<JoinHandle<()>>,
    attempts: Arc<Mutex<Attempts>>,
    signals: Sender<Signal>,
    metrics: Arc<AppenderMetrics>,
) {
    if let Some(previous) = previous {
        if previous.join().is_err() {
            warn!(generation, "previous connect thread panicked");
        }
    }

    let superseded = || attempts.lock().current != generation;
    if superseded() {
        debug!(generation, "connection attempt superseded before connecting");
        return;
    }

    let outcome = establish(client.as_ref(), &plan, superseded);

    let mut slot = attempts.lock();
    if slot.current != generation {
        drop(slot);
        match outcome {
            Ok(Some(handle)) => {
                handle.close();
                metrics.record_disconnect();
            }
            Ok(None) => {
                metrics.record_disconnect();
            }
            Err(_) => {}
        }
        debug!(generation, "closed superseded connection");
        return;
    }

    match outcome {
        Ok(Some(handle)) => {
            slot.ready = Some(handle);
            if signals.send(Signal::Ready { generation }).is_err() {
                // Dispatcher already gone: the appender was dropped meanwhile.
                if let Some(handle) = slot.ready.take() {
                    drop(slot);
                    handle.close();
                }
            }
        }
        Ok(None) => {}
        Err(error) => {
            let _ = signals.send(Signal::Failed { generation, error });
        }
    }
}

pub struct ConnectionManager {
    client: Arc<dyn BrokerClient>,
    signals: Sender<Signal>,
    metrics: Arc<AppenderMetrics>,
    state: ConnectionState,
    generation: u64,
    attempts: Arc<Mutex<Attempts>>,
    connecting: Option<JoinHandle<()>>,
    handle: Option<ExchangeHandle>,
}

impl ConnectionManager {
    pub(crate) fn new(
        client: Arc<dyn BrokerClient>,
        signals: Sender<Signal>,
        metrics: Arc<AppenderMetrics>,
    ) -> Self {
        Self {
            client,
            signals,
            metrics,
            state: ConnectionState::Absent,
            generation: 0,
            attempts: Arc::new(Mutex::new(Attempts::default())),
            connecting: None,
            handle: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Whether `configure` has ever been called
    pub fn was_configured(&self) -> bool {
        self.state != ConnectionState::Absent
    }

    /// Replace any existing connection with a new one
    ///
    /// Returns as soon as the background thread is started; readiness is
    /// delivered later through the dispatcher. The new thread does not
    /// connect before the attempt it replaces has closed its connection.
    pub fn configure(
        &mut self,
        connection: &ConnectionOptions,
        exchange: &ExchangeOptions,
        queue: Option<&QueueOptions>,
        routing_key: &str,
    ) -> Result<()> {
        if self.was_configured() {
            info!(state = %self.state, "disconnecting previous connection");
        }
        self.disconnect();
        self.supersede();

        let generation = self.generation;
        let plan = ConnectPlan {
            connection: connection.clone(),
            exchange: exchange.clone(),
            queue: queue.cloned(),
            routing_key: routing_key.to_string(),
        };
        let client = Arc::clone(&self.client);
        let previous = self.connecting.take();
        let attempts = Arc::clone(&self.attempts);
        let signals = self.signals.clone();
        let metrics = Arc::clone(&self.metrics);

        let spawned = thread::Builder::new()
            .name(format!("amqp-connect-{}", generation))
            .spawn(move || run_attempt(client, plan, generation, previous, attempts, signals, metrics));

        match spawned {
            Ok(handle) => {
                self.connecting = Some(handle);
                self.state = ConnectionState::Connecting;
                debug!(generation, url = %connection.redacted_url(), "connecting");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(AppenderError::spawn("amqp-connect", e))
            }
        }
    }

    /// Start a new generation; any connection parked by an older one is closed
    fn supersede(&mut self) {
        self.generation += 1;
        let stale = {
            let mut attempts = self.attempts.lock();
            attempts.current = self.generation;
            attempts.ready.take()
        };
        if let Some(handle) = stale {
            debug!(generation = self.generation, "closing superseded connection");
            handle.close();
            self.metrics.record_disconnect();
        }
    }

    /// Install the connection parked by attempt `generation`
    ///
    /// Returns `true` when the connection became ready.
    pub(crate) fn on_ready(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            debug!(generation, current = self.generation, "ignoring superseded readiness");
            return false;
        }
        let Some(handle) = self.attempts.lock().ready.take() else {
            return false;
        };

        info!(generation, exchange = %handle.exchange, "connection ready");
        self.handle = Some(handle);
        self.state = ConnectionState::Ready;
        self.metrics.record_connection_established();
        true
    }

    pub(crate) fn on_failed(&mut self, generation: u64, error: AppenderError) {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            debug!(generation, %error, "ignoring failure of superseded connection");
            return;
        }

        error!(generation, %error, "failed to establish connection");
        self.state = ConnectionState::Disconnected;
        self.metrics.record_connection_failure();
    }

    /// Publish one payload on the exchange
    ///
    /// Does nothing when the connection is not ready. A publish rejected
    /// because the connection was closed under us moves the manager to
    /// `Disconnected`; there is no reconnection.
    pub fn publish(
        &mut self,
        routing_key: &str,
        payload: &Value,
        options: &PublishOptions,
    ) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };

        let message = Message::from_payload(payload)?;
        let result = handle
            .connection
            .publish(&handle.exchange, routing_key, &message, options);

        if let Err(AppenderError::ConnectionClosed) = &result {
            warn!("connection closed by broker, publishing suspended until reconfiguration");
            self.disconnect();
        }
        result
    }

    /// Close the current connection, if any; safe to repeat
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
            self.metrics.record_disconnect();
        }

        match self.state {
            ConnectionState::Absent | ConnectionState::Disconnected => {}
            ConnectionState::Connecting => {
                // The in-flight attempt closes its own connection.
                self.supersede();
                self.state = ConnectionState::Disconnected;
            }
            ConnectionState::Ready => self.state = ConnectionState::Disconnected,
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
