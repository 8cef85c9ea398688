//! Error types for the Latchkey daemon

use thiserror::Error;

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors that can occur in the daemon and its IPC client
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] latchkey_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed frame or message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IPC error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// No daemon is listening and this client may not start one
    #[error("Daemon not running")]
    NotRunning,

    /// The daemon answered with an error response
    #[error("{0}")]
    Remote(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The daemon did not come up in time
    #[error("Daemon did not start within {0} ms")]
    SpawnTimeout(u64),

    /// Blocking session task failed to complete
    #[error("Session task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for DaemonError {
    fn from(e: serde_json::Error) -> Self {
        DaemonError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for DaemonError {
    fn from(e: tokio::task::JoinError) -> Self {
        DaemonError::Task(e.to_string())
    }
}
