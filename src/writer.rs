//! Dedicated writer task for outbound frames.
//!
//! Callers never touch the transport directly: they push frames into an mpsc
//! channel and a single task drains it into the [`PacketSink`]. Enqueueing is
//! synchronous ([`WriterHandle::try_send`]), so requests can be issued from
//! inside callbacks running on the dispatch loop.
//!
//! # Architecture
//!
//! ```text
//! request()     ─┐
//! subscribe()   ─┼─► mpsc::Sender<Frame> ─► Writer Task ─► PacketSink
//! dispatch loop ─┘
//! ```

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{MercuryError, Result};
use crate::protocol::Frame;
use crate::transport::PacketSink;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across callers.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Frame>,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }

    /// Enqueue a frame without waiting.
    ///
    /// Returns `Err(Backpressure)` immediately if the queue is full, and
    /// `Err(ConnectionClosed)` once the writer task has stopped.
    pub fn try_send(&self, frame: Frame) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MercuryError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => MercuryError::ConnectionClosed,
        })
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends cleanly once every handle is dropped, or with the sink's
/// error on the first failed write.
pub fn spawn_writer_task<S>(sink: S, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    S: PacketSink,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, sink));
    (WriterHandle::new(tx), task)
}

async fn writer_loop<S>(mut rx: mpsc::Receiver<Frame>, mut sink: S) -> Result<()>
where
    S: PacketSink,
{
    while let Some(frame) = rx.recv().await {
        let command = frame.command;
        if let Err(e) = sink.send_packet(frame).await {
            tracing::error!(command, "Writer failed: {}", e);
            return Err(e);
        }
    }
    Ok(())
}
