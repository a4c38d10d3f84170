//! Plain length-framed transport over any async byte stream.
//!
//! Frame layout on the stream:
//! ```text
//! ┌─────────┬──────────┬─────────────┐
//! │ Command │ Length   │ Payload     │
//! │ 1 byte  │ uint16 BE│ Length bytes│
//! └─────────┴──────────┴─────────────┘
//! ```
//!
//! This is the session layer's framing without the stream cipher. It backs
//! tests and local tooling; an encrypting transport implements the same
//! [`PacketSource`]/[`PacketSink`] traits.
//!
//! # Example
//!
//! ```ignore
//! use mercury_client::transport::StreamTransport;
//!
//! let stream = tokio::net::TcpStream::connect(addr).await?;
//! let (reader, writer) = StreamTransport::new(stream).into_split();
//! ```

use std::io::ErrorKind;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use super::{PacketSink, PacketSource};
use crate::error::{MercuryError, Result};
use crate::protocol::Frame;

/// Header size in bytes (command + length).
pub const STREAM_HEADER_SIZE: usize = 3;

/// Largest payload a single frame can carry.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// A connected byte stream, not yet split.
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Split into read and write halves.
    pub fn into_split(self) -> (StreamReader<ReadHalf<S>>, StreamWriter<WriteHalf<S>>) {
        let (read, write) = tokio::io::split(self.stream);
        (StreamReader::new(read), StreamWriter::new(write))
    }
}

/// Frame reader over an [`AsyncRead`].
pub struct StreamReader<R> {
    reader: R,
}

impl<R> StreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R> PacketSource for StreamReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn recv_packet(&mut self) -> Result<Frame> {
        // only an EOF before the first byte is a clean close
        let command = match self.reader.read_u8().await {
            Ok(command) => command,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(MercuryError::ConnectionClosed)
            }
            Err(e) => return Err(e.into()),
        };
        let len = self.reader.read_u16().await? as usize;
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;

        Ok(Frame::new(command, Bytes::from(payload)))
    }
}

/// Frame writer over an [`AsyncWrite`].
pub struct StreamWriter<W> {
    writer: W,
}

impl<W> StreamWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W> PacketSink for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send_packet(&mut self, frame: Frame) -> Result<()> {
        let len = u16::try_from(frame.payload.len()).map_err(|_| {
            MercuryError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                frame.payload.len(),
                MAX_FRAME_PAYLOAD
            ))
        })?;

        let mut buf = Vec::with_capacity(STREAM_HEADER_SIZE + frame.payload.len());
        buf.push(frame.command);
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&frame.payload);

        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_write_then_read() {
        let (client, server) = duplex(4096);
        let (_client_reader, mut client_writer) = StreamTransport::new(client).into_split();
        let (mut server_reader, _server_writer) = StreamTransport::new(server).into_split();

        client_writer
            .send_packet(Frame::from_slice(0xb2, b"hello"))
            .await
            .unwrap();
        client_writer
            .send_packet(Frame::from_slice(0x04, b""))
            .await
            .unwrap();

        let first = server_reader.recv_packet().await.unwrap();
        assert_eq!(first, Frame::from_slice(0xb2, b"hello"));
        let second = server_reader.recv_packet().await.unwrap();
        assert_eq!(second.command, 0x04);
        assert!(second.payload.is_empty());
    }

    #[tokio::test]
    async fn test_wire_bytes() {
        let mut writer = StreamWriter::new(Vec::new());
        writer
            .send_packet(Frame::from_slice(0x49, b"abc"))
            .await
            .unwrap();
        assert_eq!(writer.writer, vec![0x49, 0x00, 0x03, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_clean_eof_is_connection_closed() {
        let (client, server) = duplex(64);
        drop(client);
        let mut reader = StreamReader::new(server);
        assert!(matches!(
            reader.recv_packet().await,
            Err(MercuryError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_io_error() {
        let data: &'static [u8] = &[0xb2, 0x00, 0x10, 1, 2];
        let mut reader = StreamReader::new(data);
        assert!(matches!(
            reader.recv_packet().await,
            Err(MercuryError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_header_is_io_error() {
        for data in [&[0xb2u8][..], &[0xb2, 0x00][..]] {
            let data: &'static [u8] = data;
            let mut reader = StreamReader::new(data);
            assert!(matches!(
                reader.recv_packet().await,
                Err(MercuryError::Io(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let mut writer = StreamWriter::new(Vec::new());
        let frame = Frame::new(0xb2, Bytes::from(vec![0u8; MAX_FRAME_PAYLOAD + 1]));
        let err = writer.send_packet(frame).await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }
}
