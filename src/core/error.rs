//! Error types for the ClickHouse hook

pub type Result<T> = std::result::Result<T, HookError>;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Destination unreachable or rejected the liveness probe
    #[error("Connection to {address} failed: {message}")]
    Connection { address: String, message: String },

    /// Multi-row write rejected by the transport or the server
    #[error("Write to {table} failed: {message}")]
    Write { table: String, message: String },

    /// Record is missing one of the declared columns
    #[error("Invalid log record: missing or null column '{column}'")]
    MalformedRecord { column: String },

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Record offered after close began
    #[error("Batching engine already closed")]
    EngineClosed,

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl HookError {
    /// Create a connection error for the given address
    pub fn connection(address: impl Into<String>, message: impl Into<String>) -> Self {
        HookError::Connection {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create a write error for the given table
    pub fn write(table: impl Into<String>, message: impl Into<String>) -> Self {
        HookError::Write {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a malformed record error naming the missing or null column
    pub fn malformed(column: impl Into<String>) -> Self {
        HookError::MalformedRecord {
            column: column.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        HookError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the destination store
    pub fn is_write(&self) -> bool {
        matches!(self, HookError::Write { .. })
    }
}
