//! In-process broker implementing the broker seam
//!
//! `MemoryBroker` keeps exchanges, queues and bindings in memory and routes
//! published messages the way an AMQP broker would for fanout, direct and
//! topic exchanges (headers exchanges route like fanout). Every operation is
//! recorded in a journal so callers can check ordering, and connections can
//! be held back (gated), refused, or severed to exercise the appender's
//! connection lifecycle.

use super::{
    BrokerClient, BrokerConnection, ConnectionOptions, ExchangeKind, ExchangeOptions, Message,
    PublishOptions, QueueOptions,
};
use crate::core::{AppenderError, Result};
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One recorded broker operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOp {
    Connect { connection: u64 },
    DeclareExchange { connection: u64, exchange: String },
    DeclareQueue { connection: u64, queue: String },
    Bind {
        connection: u64,
        queue: String,
        exchange: String,
        routing_key: String,
    },
    Publish {
        connection: u64,
        exchange: String,
        routing_key: String,
    },
    Disconnect { connection: u64 },
}

/// A message as the broker received it
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub connection: u64,
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub options: PublishOptions,
}

impl PublishedMessage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Debug)]
struct QueueState {
    options: QueueOptions,
    messages: VecDeque<PublishedMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    queue: String,
    exchange: String,
    routing_key: String,
}

#[derive(Debug, Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeOptions>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    published: Vec<PublishedMessage>,
    journal: Vec<BrokerOp>,
    open: HashSet<u64>,
    next_connection: u64,
    refuse: Option<String>,
    gated: bool,
    /// Connect calls currently waiting at the gate
    held: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    changed: Condvar,
}

/// In-memory broker; clones share the same state
///
/// # Example
///
/// ```
/// use rust_amqp_appender::broker::{
///     BrokerClient, BrokerConnection, ExchangeOptions, MemoryBroker, Message, PublishOptions,
/// };
/// use serde_json::json;
///
/// let broker = MemoryBroker::new();
/// let mut connection = broker.connect(&Default::default()).unwrap();
/// connection.declare_exchange(&ExchangeOptions::default()).unwrap();
///
/// let message = Message::from_payload(&json!("hello")).unwrap();
/// connection
///     .publish("logExchange", "msg", &message, &PublishOptions::default())
///     .unwrap();
///
/// assert_eq!(broker.published_texts(), vec!["hello".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker whose connection attempts wait until [`open_gate`](Self::open_gate)
    pub fn gated() -> Self {
        let broker = Self::new();
        broker.shared.state.lock().gated = true;
        broker
    }

    /// Let pending and future connection attempts through
    pub fn open_gate(&self) {
        self.shared.state.lock().gated = false;
        self.shared.changed.notify_all();
    }

    /// Make future connection attempts wait again
    pub fn close_gate(&self) {
        self.shared.state.lock().gated = true;
    }

    /// Fail every connection attempt with `reason` until re-enabled
    pub fn refuse_connections(&self, reason: impl Into<String>) {
        self.shared.state.lock().refuse = Some(reason.into());
        self.shared.changed.notify_all();
    }

    pub fn accept_connections(&self) {
        self.shared.state.lock().refuse = None;
    }

    /// Drop every open connection from the broker side
    ///
    /// Clients are not told; their next operation fails.
    pub fn sever_connections(&self) {
        self.shared.state.lock().open.clear();
        self.shared.changed.notify_all();
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.shared.state.lock().published.clone()
    }

    pub fn published_texts(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .published
            .iter()
            .map(PublishedMessage::text)
            .collect()
    }

    pub fn published_count(&self) -> usize {
        self.shared.state.lock().published.len()
    }

    pub fn journal(&self) -> Vec<BrokerOp> {
        self.shared.state.lock().journal.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.shared.state.lock().open.len()
    }

    pub fn disconnect_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .journal
            .iter()
            .filter(|op| matches!(op, BrokerOp::Disconnect { .. }))
            .count()
    }

    pub fn exchange(&self, name: &str) -> Option<ExchangeOptions> {
        self.shared.state.lock().exchanges.get(name).cloned()
    }

    /// Messages routed to `queue` and not yet consumed
    pub fn queue_messages(&self, queue: &str) -> Vec<PublishedMessage> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Wait until at least `count` messages have been published
    pub fn wait_for_published(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.published.len() >= count)
    }

    /// Wait until at least `count` connect calls are held at the gate
    pub fn wait_for_held_connects(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.held >= count)
    }

    /// Wait until `predicate` holds for the journal
    pub fn wait_for_journal<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[BrokerOp]) -> bool,
    {
        self.wait_until(timeout, |state| predicate(state.journal.as_slice()))
    }

    fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&BrokerState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !predicate(&*state) {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return predicate(&*state);
            }
        }
        true
    }

    fn notify(&self) {
        self.shared.changed.notify_all();
    }
}

impl BrokerClient for MemoryBroker {
    fn connect(&self, options: &ConnectionOptions) -> Result<Box<dyn BrokerConnection>> {
        let mut state = self.shared.state.lock();
        if state.gated && state.refuse.is_none() {
            state.held += 1;
            self.shared.changed.notify_all();
            while state.gated && state.refuse.is_none() {
                self.shared.changed.wait(&mut state);
            }
            state.held -= 1;
        }
        if let Some(reason) = &state.refuse {
            return Err(AppenderError::connection(options.redacted_url(), reason.clone()));
        }

        state.next_connection += 1;
        let id = state.next_connection;
        state.open.insert(id);
        state.journal.push(BrokerOp::Connect { connection: id });
        drop(state);
        self.notify();

        Ok(Box::new(MemoryConnection {
            id,
            broker: self.clone(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    id: u64,
    broker: MemoryBroker,
    closed: bool,
}

impl MemoryConnection {
    fn with_state<T>(&self, op: impl FnOnce(&mut BrokerState) -> Result<T>) -> Result<T> {
        let mut state = self.broker.shared.state.lock();
        if self.closed || !state.open.contains(&self.id) {
            return Err(AppenderError::ConnectionClosed);
        }
        let result = op(&mut *state);
        drop(state);
        self.broker.notify();
        result
    }
}

impl BrokerConnection for MemoryConnection {
    fn declare_exchange(&mut self, exchange: &ExchangeOptions) -> Result<()> {
        let id = self.id;
        self.with_state(|state| {
            if let Some(existing) = state.exchanges.get(&exchange.name) {
                if existing != exchange {
                    return Err(AppenderError::broker(
                        "exchange.declare",
                        format!(
                            "PRECONDITION_FAILED - inequivalent arguments for exchange '{}'",
                            exchange.name
                        ),
                    ));
                }
            } else {
                state.exchanges.insert(exchange.name.clone(), exchange.clone());
            }
            state.journal.push(BrokerOp::DeclareExchange {
                connection: id,
                exchange: exchange.name.clone(),
            });
            Ok(())
        })
    }

    fn declare_queue(&mut self, queue: &QueueOptions) -> Result<()> {
        let id = self.id;
        self.with_state(|state| {
            match state.queues.get(&queue.name) {
                Some(existing) if existing.options.durable != queue.durable => {
                    return Err(AppenderError::broker(
                        "queue.declare",
                        format!(
                            "PRECONDITION_FAILED - inequivalent arg 'durable' for queue '{}'",
                            queue.name
                        ),
                    ));
                }
                Some(_) => {}
                None => {
                    state.queues.insert(
                        queue.name.clone(),
                        QueueState {
                            options: queue.clone(),
                            messages: VecDeque::new(),
                        },
                    );
                }
            }
            state.journal.push(BrokerOp::DeclareQueue {
                connection: id,
                queue: queue.name.clone(),
            });
            Ok(())
        })
    }

    fn bind_queue(&mut self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        let id = self.id;
        self.with_state(|state| {
            if !state.queues.contains_key(queue) {
                return Err(AppenderError::broker(
                    "queue.bind",
                    format!("NOT_FOUND - no queue '{}'", queue),
                ));
            }
            if !state.exchanges.contains_key(exchange) {
                return Err(AppenderError::broker(
                    "queue.bind",
                    format!("NOT_FOUND - no exchange '{}'", exchange),
                ));
            }
            let binding = Binding {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
            };
            if !state.bindings.contains(&binding) {
                state.bindings.push(binding);
            }
            state.journal.push(BrokerOp::Bind {
                connection: id,
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
            });
            Ok(())
        })
    }

    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
        options: &PublishOptions,
    ) -> Result<()> {
        let id = self.id;
        self.with_state(|state| {
            let kind = match state.exchanges.get(exchange) {
                Some(declared) => declared.kind,
                None => {
                    return Err(AppenderError::broker(
                        "basic.publish",
                        format!("NOT_FOUND - no exchange '{}'", exchange),
                    ))
                }
            };

            let published = PublishedMessage {
                connection: id,
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                body: message.body.clone(),
                content_type: message.content_type,
                options: options.clone(),
            };

            let targets: Vec<String> = state
                .bindings
                .iter()
                .filter(|b| b.exchange == exchange && routes(kind, &b.routing_key, routing_key))
                .map(|b| b.queue.clone())
                .collect();
            for queue in targets {
                if let Some(q) = state.queues.get_mut(&queue) {
                    q.messages.push_back(published.clone());
                }
            }

            state.published.push(published);
            state.journal.push(BrokerOp::Publish {
                connection: id,
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
            });
            Ok(())
        })
    }

    fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut state = self.broker.shared.state.lock();
        state.open.remove(&self.id);
        state.journal.push(BrokerOp::Disconnect {
            connection: self.id,
        });
        drop(state);
        self.broker.notify();
    }
}

fn routes(kind: ExchangeKind, binding_key: &str, routing_key: &str) -> bool {
    match kind {
        ExchangeKind::Fanout | ExchangeKind::Headers => true,
        ExchangeKind::Direct => binding_key == routing_key,
        ExchangeKind::Topic => {
            let pattern: Vec<&str> = binding_key.split('.').collect();
            let words: Vec<&str> = routing_key.split('.').collect();
            topic_matches(&pattern, &words)
        }
    }
}

/// `*` matches exactly one word, `#` zero or more
fn topic_matches(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((&"#", rest)) => (0..=words.len()).any(|skip| topic_matches(rest, &words[skip..])),
        Some((&"*", rest)) => !words.is_empty() && topic_matches(rest, &words[1..]),
        Some((word, rest)) => words.first() == Some(word) && topic_matches(rest, &words[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn text(body: &str) -> Message {
        Message::from_payload(&json!(body)).unwrap()
    }

    fn exchange(name: &str, kind: ExchangeKind) -> ExchangeOptions {
        ExchangeOptions {
            name: name.to_string(),
            kind,
            ..Default::default()
        }
    }

    fn queue(name: &str) -> QueueOptions {
        QueueOptions {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_topic_matching() {
        assert!(routes(ExchangeKind::Topic, "app.*", "app.web"));
        assert!(!routes(ExchangeKind::Topic, "app.*", "app.web.db"));
        assert!(routes(ExchangeKind::Topic, "app.#", "app"));
        assert!(routes(ExchangeKind::Topic, "app.#", "app.web.db"));
        assert!(routes(ExchangeKind::Topic, "#.error", "app.web.error"));
        assert!(!routes(ExchangeKind::Topic, "app.web", "app.db"));
    }

    #[test]
    fn test_direct_routing_to_bound_queue() {
        let broker = MemoryBroker::new();
        let mut conn = broker.connect(&ConnectionOptions::default()).unwrap();
        conn.declare_exchange(&exchange("logs", ExchangeKind::Direct)).unwrap();
        conn.declare_queue(&queue("errors")).unwrap();
        conn.bind_queue("errors", "logs", "error").unwrap();

        let opts = PublishOptions::default();
        conn.publish("logs", "error", &text("boom"), &opts).unwrap();
        conn.publish("logs", "info", &text("fine"), &opts).unwrap();

        let routed = broker.queue_messages("errors");
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].text(), "boom");
        assert_eq!(broker.published_count(), 2);
    }

    #[test]
    fn test_redeclare_with_different_kind_fails() {
        let broker = MemoryBroker::new();
        let mut conn = broker.connect(&ConnectionOptions::default()).unwrap();
        conn.declare_exchange(&exchange("logs", ExchangeKind::Fanout)).unwrap();
        conn.declare_exchange(&exchange("logs", ExchangeKind::Fanout)).unwrap();

        let err = conn
            .declare_exchange(&exchange("logs", ExchangeKind::Topic))
            .unwrap_err();
        assert!(err.to_string().contains("PRECONDITION_FAILED"));
    }

    #[test]
    fn test_publish_to_undeclared_exchange_fails() {
        let broker = MemoryBroker::new();
        let mut conn = broker.connect(&ConnectionOptions::default()).unwrap();
        let err = conn
            .publish("missing", "msg", &text("x"), &PublishOptions::default())
            .unwrap_err();
        assert!(matches!(err, AppenderError::BrokerError { .. }));
    }

    #[test]
    fn test_disconnect_is_idempotent_and_closes() {
        let broker = MemoryBroker::new();
        let mut conn = broker.connect(&ConnectionOptions::default()).unwrap();
        assert_eq!(broker.open_connections(), 1);

        conn.disconnect();
        conn.disconnect();

        assert_eq!(broker.open_connections(), 0);
        assert_eq!(broker.disconnect_count(), 1);
        assert!(matches!(
            conn.declare_exchange(&ExchangeOptions::default()),
            Err(AppenderError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_severed_connection_rejects_operations() {
        let broker = MemoryBroker::new();
        let mut conn = broker.connect(&ConnectionOptions::default()).unwrap();
        broker.sever_connections();

        assert!(matches!(
            conn.declare_exchange(&ExchangeOptions::default()),
            Err(AppenderError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_refused_connection() {
        let broker = MemoryBroker::new();
        broker.refuse_connections("ECONNREFUSED");

        let err = broker.connect(&ConnectionOptions::default()).err().unwrap();
        assert!(err.to_string().contains("ECONNREFUSED"));
        assert!(err.to_string().contains("guest:***"));
    }

    #[test]
    fn test_gated_connect_waits_for_open_gate() {
        let broker = MemoryBroker::gated();
        let client = broker.clone();
        let handle = thread::spawn(move || client.connect(&ConnectionOptions::default()).is_ok());

        assert!(broker.wait_for_held_connects(1, Duration::from_secs(5)));
        assert_eq!(broker.open_connections(), 0);

        broker.open_gate();
        assert!(handle.join().unwrap());
        assert_eq!(broker.open_connections(), 1);

        broker.close_gate();
        let client = broker.clone();
        let handle = thread::spawn(move || client.connect(&ConnectionOptions::default()).is_ok());
        assert!(broker.wait_for_held_connects(1, Duration::from_secs(5)));
        assert_eq!(broker.open_connections(), 1);

        broker.open_gate();
        assert!(handle.join().unwrap());
        assert_eq!(broker.open_connections(), 2);
    }

    #[test]
    fn test_refused_connection_releases_held_connects() {
        let broker = MemoryBroker::gated();
        let client = broker.clone();
        let handle = thread::spawn(move || client.connect(&ConnectionOptions::default()).is_err());

        assert!(broker.wait_for_held_connects(1, Duration::from_secs(5)));
        broker.refuse_connections("ECONNREFUSED");

        assert!(handle.join().unwrap());
        assert!(broker.journal().is_empty());
    }
}
