//! Trace persistence error types.

use thiserror::Error;

/// Errors that can occur while saving or loading a trace log.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Serialization to JSON or binary format failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Deserialization from JSON or binary format failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Trace document version is not supported by this version
    #[error("Unsupported trace version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Sink names become file names and must not contain path separators
    #[error("Invalid trace name '{0}'")]
    InvalidName(String),

    #[error("Trace I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The log's writer thread has exited
    #[error("Trace log is closed")]
    Closed,
}
