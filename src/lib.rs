//! # Rust AMQP Appender
//!
//! A log appender that ships events to an AMQP exchange without ever
//! blocking the caller on the network.
//!
//! ## Features
//!
//! - **Buffered**: Events logged before the broker is reachable are kept and published in order
//! - **Batching**: Publish each event immediately, or collect them for a send interval
//! - **Reconfigurable**: Swap the broker, exchange, or queue at runtime without losing events
//! - **Layouts**: Pass-through, basic, pattern, or custom message rendering
//!
//! ## Example
//!
//! ```
//! use rust_amqp_appender::prelude::*;
//! use rust_amqp_appender::broker::MemoryBroker;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let broker = MemoryBroker::new();
//! let config = AppenderConfig::from_json(
//!     r#"{ "exchange": { "name": "audit" }, "publish": { "routingKey": "web" } }"#,
//! ).expect("valid json");
//!
//! let appender = rust_amqp_appender::configure(Arc::new(broker.clone()), config)
//!     .expect("valid configuration");
//! appender.append(LogEvent::message(LogLevel::Warn, "auth", "login throttled"));
//!
//! assert!(broker.wait_for_published(1, Duration::from_secs(5)));
//! assert_eq!(broker.published()[0].exchange, "audit");
//! ```

pub mod appenders;
pub mod broker;
pub mod core;

pub mod prelude {
    pub use crate::appenders::{AmqpAppender, AmqpAppenderBuilder, AppenderConfig, ConnectionState};
    pub use crate::broker::{
        BrokerClient, DeliveryMode, ExchangeKind, ExchangeOptions, PublishOptions, QueueOptions,
    };
    pub use crate::core::{
        Appender, AppenderError, AppenderMetrics, Layout, LayoutConfig, LogEvent, LogLevel,
        Payload, PendingEvent, Result,
    };
}

pub use appenders::amqp::{default_interceptor, merge_defaults, EventInterceptor};
pub use appenders::{configure, AmqpAppender, AmqpAppenderBuilder, AppenderConfig, AppenderOptions, ConnectionState};
pub use broker::{BrokerClient, BrokerConnection, ConnectionOptions, ExchangeOptions, PublishOptions, QueueOptions};
pub use core::{
    Appender, AppenderError, AppenderMetrics, Layout, LayoutConfig, LogEvent, LogLevel, Payload,
    PendingEvent, Result,
};
