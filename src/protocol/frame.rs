//! Frame struct exchanged with the transport.
//!
//! A frame is a command byte plus an opaque payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use mercury_client::protocol::{command, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(command::PING, Bytes::from_static(b"\x00\x01"));
//!
//! assert_eq!(frame.command(), command::PING);
//! assert_eq!(frame.payload(), b"\x00\x01");
//! ```

use bytes::Bytes;

/// A transport-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command byte.
    pub command: u8,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from a command byte and payload.
    pub fn new(command: u8, payload: Bytes) -> Self {
        Self { command, payload }
    }

    /// Create a frame from raw bytes (copies data).
    pub fn from_slice(command: u8, payload: &[u8]) -> Self {
        Self {
            command,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get the command byte.
    #[inline]
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
