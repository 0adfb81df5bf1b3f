//! Appender implementations

pub mod amqp;

pub use amqp::{configure, AmqpAppender, AmqpAppenderBuilder, AppenderConfig, AppenderOptions, ConnectionState};

pub use crate::core::Appender;
