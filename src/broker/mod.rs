//! Seam between the appender and an AMQP client library
//!
//! The appender never speaks the wire protocol itself. It drives a
//! [`BrokerClient`] to open connections and a [`BrokerConnection`] to
//! declare topology and publish. Implementations are expected to block
//! until the broker confirms each step; the appender runs connection setup
//! on a background thread so producers never wait on it.

pub mod options;

#[cfg(feature = "memory-broker")]
pub mod memory;

#[cfg(feature = "amqp-client")]
pub mod amqp;

use crate::core::Result;
use serde_json::Value;

pub use options::{
    ConnectionOptions, DeliveryMode, ExchangeKind, ExchangeOptions, PublishOptions, QueueOptions,
};

#[cfg(feature = "memory-broker")]
pub use memory::{BrokerOp, MemoryBroker, PublishedMessage};

#[cfg(feature = "amqp-client")]
pub use amqp::AmqpClient;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Encoded message body with its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

impl Message {
    /// Encode an outbound payload
    ///
    /// Strings travel as their raw text; every other value is serialized
    /// as JSON.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        match payload {
            Value::String(text) => Ok(Self {
                body: text.as_bytes().to_vec(),
                content_type: CONTENT_TYPE_TEXT,
            }),
            other => Ok(Self {
                body: serde_json::to_vec(other)?,
                content_type: CONTENT_TYPE_JSON,
            }),
        }
    }
}

/// Factory for broker connections
pub trait BrokerClient: Send + Sync {
    /// Open a connection; blocks until the broker accepts it
    fn connect(&self, options: &ConnectionOptions) -> Result<Box<dyn BrokerConnection>>;
}

/// An open broker connection
pub trait BrokerConnection: Send {
    /// Create the exchange if it does not exist
    fn declare_exchange(&mut self, exchange: &ExchangeOptions) -> Result<()>;

    /// Create the queue if it does not exist
    fn declare_queue(&mut self, queue: &QueueOptions) -> Result<()>;

    fn bind_queue(&mut self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
        options: &PublishOptions,
    ) -> Result<()>;

    /// Close the connection; calling it again has no effect
    fn disconnect(&mut self);
}
