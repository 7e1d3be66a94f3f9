//! Error types for the logger system

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Level name or number that does not map to a level
    #[error("Invalid log level: '{0}'")]
    InvalidLevel(String),

    /// A logger configuration refers to an appender that was never declared
    #[error("Unknown appender '{name}'")]
    UnknownAppender { name: String },

    /// Failure inside a transport. Swallowed at the appender boundary.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The process-wide registry was already created
    #[error("Process-wide log registry is already initialized")]
    AlreadyInitialized,
}

impl LoggerError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn unknown_appender(name: impl Into<String>) -> Self {
        LoggerError::UnknownAppender { name: name.into() }
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        LoggerError::Transport(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LoggerError::config("Appender 'ajax'", "maxBatchSize < batchSize");
        assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));

        let err = LoggerError::unknown_appender("missing");
        assert!(matches!(err, LoggerError::UnknownAppender { .. }));

        let err = LoggerError::transport("connection refused");
        assert!(matches!(err, LoggerError::Transport(_)));
    }

    #[test]
    fn test_error_display() {
        let err = LoggerError::config("Appender 'ajax'", "max_batch_size (1) < batch_size (5)");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for Appender 'ajax': max_batch_size (1) < batch_size (5)"
        );

        let err = LoggerError::InvalidLevel("LOUD".to_string());
        assert_eq!(err.to_string(), "Invalid log level: 'LOUD'");

        let err = LoggerError::unknown_appender("ajax2");
        assert_eq!(err.to_string(), "Unknown appender 'ajax2'");
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = LoggerError::io_operation("reading logging configuration", "logging.json", io_err);

        assert!(matches!(err, LoggerError::IoOperation { .. }));
        assert!(err.to_string().contains("reading logging configuration"));
        assert!(err.to_string().contains("logging.json"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: LoggerError = json_err.into();
        assert!(matches!(err, LoggerError::JsonError(_)));
    }
}
