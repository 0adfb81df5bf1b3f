//! Final flush and disconnect

use super::context::AppenderContext;
use tracing::info;

impl AppenderContext {
    /// Flush what can still be published, then disconnect
    ///
    /// Without a ready connection the flush publishes nothing and the
    /// remaining events are left behind. Repeating the call is harmless.
    pub(crate) fn shutdown(&mut self) {
        if !self.connection.was_configured() {
            info!("shutdown requested, no connection was ever configured");
            return;
        }

        let state = self.connection.state();
        self.flush();
        if !self.buffer.is_empty() {
            info!(
                state = %state,
                unpublished = self.buffer.len(),
                "connection not ready at shutdown, buffered events are not published"
            );
        }

        self.connection.disconnect();
        info!(published = self.metrics.events_published(), "amqp appender shut down");
    }
}
