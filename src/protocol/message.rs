//! Mercury request encoding and response decoding.
//!
//! Both directions share one layout (see [`wire_format`](super::wire_format)):
//! a fixed preamble followed by size-prefixed parts, the first of which is the
//! serialized header.

use bytes::{BufMut, Bytes, BytesMut};

use super::header::{HeaderCodec, MercuryHeader};
use super::wire_format::{
    MercuryMethod, SequenceId, FLAG_FINAL, FRAME_PREFIX, PART_LENGTH_SIZE, PREAMBLE_SIZE,
};
use super::Frame;
use crate::error::{MercuryError, Result};

/// An outbound Mercury request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MercuryRequest {
    pub method: MercuryMethod,
    pub uri: String,
    /// Payload parts, sent after the header in order.
    pub parts: Vec<Bytes>,
}

impl MercuryRequest {
    pub fn new(method: MercuryMethod, uri: impl Into<String>, parts: Vec<Bytes>) -> Self {
        Self {
            method,
            uri: uri.into(),
            parts,
        }
    }

    /// Encode this request with the given sequence id into a transport frame.
    ///
    /// The frame's command byte is the method's command.
    pub fn encode(&self, sequence_id: SequenceId, codec: &dyn HeaderCodec) -> Result<Frame> {
        let header = codec.encode(&MercuryHeader::new(self.method.name(), &self.uri));

        let part_count = u32::try_from(self.parts.len() + 1)
            .map_err(|_| MercuryError::Protocol("Too many parts".to_string()))?;

        let body_len: usize = self.parts.iter().map(|p| PART_LENGTH_SIZE + p.len()).sum();
        let mut buf =
            BytesMut::with_capacity(PREAMBLE_SIZE + PART_LENGTH_SIZE + header.len() + body_len);

        buf.put_slice(&FRAME_PREFIX);
        buf.put_u64(sequence_id);
        buf.put_u8(FLAG_FINAL);
        buf.put_u32(part_count);

        put_part(&mut buf, &header)?;
        for part in &self.parts {
            put_part(&mut buf, part)?;
        }

        Ok(Frame::new(self.method.command(), buf.freeze()))
    }
}

fn put_part(buf: &mut BytesMut, part: &[u8]) -> Result<()> {
    let len = u32::try_from(part.len()).map_err(|_| {
        MercuryError::Protocol(format!("Part of {} bytes exceeds u32 length", part.len()))
    })?;
    buf.put_u32(len);
    buf.put_slice(part);
    Ok(())
}

/// A decoded inbound Mercury message (reply or push).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MercuryResponse {
    pub sequence_id: SequenceId,
    /// Decoded header part.
    pub header: MercuryHeader,
    /// Payload parts after the header.
    pub parts: Vec<Bytes>,
}

impl MercuryResponse {
    /// Decode an inbound payload.
    ///
    /// Malformed input (truncated preamble, truncated length prefix, or a part
    /// larger than the remaining bytes) is a protocol error.
    pub fn decode(payload: &Bytes, codec: &dyn HeaderCodec) -> Result<Self> {
        if payload.len() < PREAMBLE_SIZE {
            return Err(MercuryError::Protocol(format!(
                "Payload of {} bytes shorter than {} byte preamble",
                payload.len(),
                PREAMBLE_SIZE
            )));
        }

        let mut pos = FRAME_PREFIX.len();
        let sequence_id = u64::from_be_bytes(read_array(payload, pos));
        pos += 8;
        // flags byte carries nothing we route on
        pos += 1;
        let part_count = u32::from_be_bytes(read_array(payload, pos));
        pos += 4;

        if part_count == 0 {
            return Err(MercuryError::Protocol("Missing header part".to_string()));
        }

        let header_bytes = next_part(payload, &mut pos)?;
        let header = codec.decode(&header_bytes)?;

        let mut parts = Vec::new();
        for _ in 1..part_count {
            parts.push(next_part(payload, &mut pos)?);
        }

        Ok(Self {
            sequence_id,
            header,
            parts,
        })
    }

    /// Destination URI, if the header carried one.
    pub fn uri(&self) -> Option<&str> {
        if self.header.uri.is_empty() {
            None
        } else {
            Some(&self.header.uri)
        }
    }

    /// Method named in the header.
    pub fn method(&self) -> Option<MercuryMethod> {
        MercuryMethod::from_name(&self.header.method)
    }

    /// Status code, if the header carried one.
    pub fn status_code(&self) -> Option<i32> {
        self.header.status_code
    }
}

/// Caller guarantees `pos + N <= buf.len()`.
fn read_array<const N: usize>(buf: &[u8], pos: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[pos..pos + N]);
    out
}

fn next_part(payload: &Bytes, pos: &mut usize) -> Result<Bytes> {
    let remaining = payload.len() - *pos;
    if remaining < PART_LENGTH_SIZE {
        return Err(MercuryError::Protocol(format!(
            "Part length prefix truncated at offset {}",
            *pos
        )));
    }
    let len = u32::from_be_bytes(read_array(payload, *pos)) as usize;
    *pos += PART_LENGTH_SIZE;

    let remaining = remaining - PART_LENGTH_SIZE;
    if len > remaining {
        return Err(MercuryError::Protocol(format!(
            "Part size {} exceeds remaining {} bytes",
            len, remaining
        )));
    }
    let part = payload.slice(*pos..*pos + len);
    *pos += len;
    Ok(part)
}
