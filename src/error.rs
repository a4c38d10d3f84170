//! Error types for mercury-client.

use thiserror::Error;

use crate::protocol::SequenceId;

/// Main error type for all Mercury operations.
#[derive(Debug, Error)]
pub enum MercuryError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (device config only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed frame, header, or unknown command byte.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed, either by the remote or after the dispatch loop stopped.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Every sequence id has been handed out on this connection.
    #[error("Sequence ids exhausted")]
    SequenceExhausted,

    /// No response arrived for the request before its deadline.
    #[error("Request {0} timed out")]
    Timeout(SequenceId),

    /// Outbound queue is full.
    #[error("Writer queue full")]
    Backpressure,
}

impl MercuryError {
    /// Whether this error means the connection itself is gone.
    pub fn is_transport(&self) -> bool {
        matches!(self, MercuryError::Io(_) | MercuryError::ConnectionClosed)
    }
}

/// Result type alias using MercuryError.
pub type Result<T> = std::result::Result<T, MercuryError>;
