//! Error types for benchwatch

use thiserror::Error;

/// Errors that can occur in the monitoring engine
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Audit store unavailable or failing
    ///
    /// Transient: ingestion swallows it, the sweep retries on the
    /// next tick. Never surfaced to the request that triggered it.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Audit store I/O exceeded its bounded timeout
    #[error("Storage operation timed out after {0} ms")]
    StorageTimeout(u64),

    /// Delivery to a single observer failed
    ///
    /// The observer is removed from the registry; producers are
    /// never affected.
    #[error("Failed to deliver to observer '{observer}': {reason}")]
    Delivery { observer: String, reason: String },

    /// Pull API called with an unknown observer handle
    #[error("Observer not connected: {0}")]
    NotConnected(String),

    /// Invalid configuration, fatal at startup only
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure in the file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for monitoring operations
pub type Result<T> = std::result::Result<T, MonitorError>;
