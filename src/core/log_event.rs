//! Log event structures
//!
//! A [`LogEvent`] is what the host logging framework hands to an appender.
//! Before it is buffered it is normalized exactly once into a
//! [`PendingEvent`], whose [`Payload`] records which shape the data had.

use super::layout::Layout;
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A log record as produced by the host framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub start_time: DateTime<Utc>,
    /// Arguments passed to the logging call, in order
    pub data: Vec<Value>,
    pub level: LogLevel,
    pub category: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            start_time: Utc::now(),
            data,
            level,
            category: category.into(),
        }
    }

    /// Event carrying a single text message
    pub fn message(level: LogLevel, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(level, category, vec![Value::String(message.into())])
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.data.push(arg.into());
        self
    }
}

/// Event data after normalization
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Output of the layout; produced when the first argument was a string
    Rendered(String),
    /// The sole non-string argument, unwrapped
    Single(Value),
    /// Zero or several arguments, left for the interceptor to reduce
    List(Vec<Value>),
}

impl Payload {
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Rendered(text) => Value::String(text.clone()),
            Payload::Single(value) => value.clone(),
            Payload::List(values) => Value::Array(values.clone()),
        }
    }
}

/// A normalized event waiting in the buffer
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub start_time: DateTime<Utc>,
    pub level: LogLevel,
    pub category: String,
    pub payload: Payload,
}

impl PendingEvent {
    pub fn normalize(mut event: LogEvent, layout: &Layout) -> Self {
        let payload = match event.data.first() {
            Some(Value::String(_)) => Payload::Rendered(layout.render(&event)),
            _ if event.data.len() == 1 => match event.data.pop() {
                Some(value) => Payload::Single(value),
                None => Payload::List(Vec::new()),
            },
            _ => Payload::List(std::mem::take(&mut event.data)),
        };

        Self {
            start_time: event.start_time,
            level: event.level,
            category: event.category,
            payload,
        }
    }
}
