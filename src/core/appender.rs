//! Appender trait for log output destinations

use super::{error::Result, log_event::LogEvent};

/// Contract between the host logging framework and an output destination
///
/// `append` is called once per emitted log record and must not fail
/// observably; destinations that can fail internally absorb the failure.
pub trait Appender: Send + Sync {
    fn append(&self, event: LogEvent);
    fn flush(&self) -> Result<()>;
    fn name(&self) -> &str;
}
