//! Error types for the AMQP appender

pub type Result<T> = std::result::Result<T, AppenderError>;

#[derive(Debug, thiserror::Error)]
pub enum AppenderError {
    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Connection could not be established
    #[error("Connection to '{url}' failed: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Broker rejected an operation on an open connection
    #[error("Broker error during {operation}: {message}")]
    BrokerError { operation: String, message: String },

    /// Operation attempted on a connection that was already closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Layout could not be built or applied
    #[error("Layout error ({layout}): {message}")]
    LayoutError { layout: String, message: String },

    /// Background worker could not be started
    #[error("Failed to spawn {worker} thread: {source}")]
    SpawnError {
        worker: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppenderError {
    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        AppenderError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a connection failure error
    pub fn connection(url: impl Into<String>, message: impl Into<String>) -> Self {
        AppenderError::ConnectionFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a broker operation error
    pub fn broker(operation: impl Into<String>, message: impl Into<String>) -> Self {
        AppenderError::BrokerError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a layout error
    pub fn layout(layout: impl Into<String>, message: impl Into<String>) -> Self {
        AppenderError::LayoutError {
            layout: layout.into(),
            message: message.into(),
        }
    }

    pub fn spawn(worker: impl Into<String>, source: std::io::Error) -> Self {
        AppenderError::SpawnError {
            worker: worker.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AppenderError::config("exchange", "name must not be empty");
        assert!(matches!(err, AppenderError::InvalidConfiguration { .. }));

        let err = AppenderError::connection("amqp://localhost", "refused");
        assert!(matches!(err, AppenderError::ConnectionFailed { .. }));

        let err = AppenderError::broker("publish", "no such exchange");
        assert!(matches!(err, AppenderError::BrokerError { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = AppenderError::config("exchange", "name must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for exchange: name must not be empty"
        );

        let err = AppenderError::connection("amqp://localhost:5672", "connection refused");
        assert_eq!(
            err.to_string(),
            "Connection to 'amqp://localhost:5672' failed: connection refused"
        );

        let err = AppenderError::layout("pattern", "unterminated %d{");
        assert_eq!(err.to_string(), "Layout error (pattern): unterminated %d{");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AppenderError = json_err.into();

        assert!(matches!(err, AppenderError::JsonError(_)));
        assert!(err.to_string().starts_with("JSON error:"));
    }
}
