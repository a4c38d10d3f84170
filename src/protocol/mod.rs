//! Protocol module - wire format, header codec, and Mercury messages.
//!
//! This module implements the byte-level side of the protocol:
//! - Command bytes and method mapping
//! - Header record serialization
//! - Request encoding / response decoding

mod frame;
mod header;
mod message;
mod wire_format;

pub use frame::Frame;
pub use header::{HeaderCodec, MercuryHeader, ProtobufHeaderCodec};
pub use message::{MercuryRequest, MercuryResponse};
pub use wire_format::{
    classify, command, InboundKind, MercuryMethod, SequenceId, FLAG_FINAL, FRAME_PREFIX,
    PART_LENGTH_SIZE, PREAMBLE_SIZE,
};
