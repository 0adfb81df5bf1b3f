//! Core appender types and traits

pub mod appender;
pub mod error;
pub mod layout;
pub mod log_event;
pub mod log_level;
pub mod metrics;

pub use appender::Appender;
pub use error::{AppenderError, Result};
pub use layout::{Layout, LayoutConfig, LayoutFn, PatternLayout};
pub use log_event::{LogEvent, Payload, PendingEvent};
pub use log_level::LogLevel;
pub use metrics::AppenderMetrics;
