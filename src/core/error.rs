//! Error types for the output system

pub type Result<T> = std::result::Result<T, OutputError>;

/// Error type returned by cleanup actions
pub type CleanupError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a single cleanup action
pub type CleanupResult = std::result::Result<(), CleanupError>;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON configuration error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A shutdown was already triggered by another caller
    #[error("Shutdown already in progress")]
    ShuttingDown,

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Unknown or malformed timezone name
    #[error("Invalid timezone '{0}'")]
    InvalidTimezone(String),

    /// Write to a file destination failed
    #[error("File write failed for {destination}: {message}")]
    FileWriteError {
        destination: String,
        message: String,
    },

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotationError { path: String, message: String },

    /// Export sink rejected a message
    #[error("Export to {class} failed: {message}")]
    ExportError { class: String, message: String },

    /// Signal subscription failed
    #[error("Signal registration failed: {0}")]
    SignalError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl OutputError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        OutputError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        OutputError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn file_write(destination: impl Into<String>, message: impl Into<String>) -> Self {
        OutputError::FileWriteError {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        OutputError::FileRotationError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn export(class: impl Into<String>, message: impl Into<String>) -> Self {
        OutputError::ExportError {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        OutputError::Other(msg.into())
    }
}
