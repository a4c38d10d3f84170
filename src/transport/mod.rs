//! Transport module - the seam between the engine and the connection.
//!
//! The engine only needs two operations: read the next frame and write a
//! frame. [`PacketSource`] and [`PacketSink`] express those; the encrypted
//! session layer (or [`StreamTransport`] for plain byte streams) implements
//! them.

use std::future::Future;

use crate::error::Result;
use crate::protocol::Frame;

mod stream;

pub use stream::{StreamReader, StreamTransport, StreamWriter, MAX_FRAME_PAYLOAD, STREAM_HEADER_SIZE};

/// Read side of an authenticated connection.
pub trait PacketSource: Send + 'static {
    /// Wait for the next frame.
    ///
    /// Fails with [`MercuryError::ConnectionClosed`](crate::MercuryError::ConnectionClosed)
    /// when the remote closes, or another error when the connection is corrupted.
    fn recv_packet(&mut self) -> impl Future<Output = Result<Frame>> + Send;
}

/// Write side of an authenticated connection.
pub trait PacketSink: Send + 'static {
    /// Write one frame.
    fn send_packet(&mut self, frame: Frame) -> impl Future<Output = Result<()>> + Send;
}
