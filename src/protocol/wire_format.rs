//! Wire format constants and method/command mapping.
//!
//! Mercury request payload layout:
//! ```text
//! ┌────────┬──────────┬───────┬──────────┬─────────────────────┬──────────────────┐
//! │ Prefix │ Seq ID   │ Flags │ Parts    │ Header part         │ Payload parts... │
//! │ 00 04  │ 8 bytes  │ 0x01  │ 4 bytes  │ size(4) + bytes     │ size(4) + bytes  │
//! │        │ uint64 BE│       │ uint32 BE│                     │                  │
//! └────────┴──────────┴───────┴──────────┴─────────────────────┴──────────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. `Parts` counts the header part too.

use std::fmt;

/// Sequence identifier correlating a request with its response.
pub type SequenceId = u64;

/// Fixed two bytes at the start of every Mercury payload.
pub const FRAME_PREFIX: [u8; 2] = [0x00, 0x04];

/// Fixed flags byte following the sequence id.
pub const FLAG_FINAL: u8 = 0x01;

/// Bytes before the first part: prefix + seq id + flags + part count.
pub const PREAMBLE_SIZE: usize = FRAME_PREFIX.len() + 8 + 1 + 4;

/// Size of each part's length prefix.
pub const PART_LENGTH_SIZE: usize = 4;

/// Transport-level command bytes.
pub mod command {
    /// SEND and GET requests, and their replies.
    pub const REQUEST: u8 = 0xb2;
    /// SUB request and its acknowledgement.
    pub const SUB: u8 = 0xb3;
    /// UNSUB request and its acknowledgement.
    pub const UNSUB: u8 = 0xb4;
    /// Server-initiated push to a subscribed URI.
    pub const EVENT: u8 = 0xb5;
    /// Keepalive from the server.
    pub const PING: u8 = 0x04;
    /// Keepalive reply, echoing the ping payload.
    pub const PONG: u8 = 0x49;
}

/// Mercury request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MercuryMethod {
    Send,
    Get,
    Sub,
    Unsub,
}

impl MercuryMethod {
    /// Command byte this method is sent with.
    #[inline]
    pub fn command(self) -> u8 {
        match self {
            MercuryMethod::Send | MercuryMethod::Get => command::REQUEST,
            MercuryMethod::Sub => command::SUB,
            MercuryMethod::Unsub => command::UNSUB,
        }
    }

    /// Method name written into the header.
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            MercuryMethod::Send => "SEND",
            MercuryMethod::Get => "GET",
            MercuryMethod::Sub => "SUB",
            MercuryMethod::Unsub => "UNSUB",
        }
    }

    /// Parse a header method name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SEND" => Some(MercuryMethod::Send),
            "GET" => Some(MercuryMethod::Get),
            "SUB" => Some(MercuryMethod::Sub),
            "UNSUB" => Some(MercuryMethod::Unsub),
            _ => None,
        }
    }
}

impl fmt::Display for MercuryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the dispatch loop routes an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// Keepalive; echo and stop.
    Ping,
    /// Reply to a locally originated request; routed by sequence id.
    Reply,
    /// Server push; routed by URI.
    Push,
    /// Anything else.
    Unknown(u8),
}

/// Classify an inbound command byte.
pub fn classify(command: u8) -> InboundKind {
    match command {
        command::PING => InboundKind::Ping,
        command::REQUEST | command::SUB | command::UNSUB => InboundKind::Reply,
        command::EVENT => InboundKind::Push,
        other => InboundKind::Unknown(other),
    }
}
