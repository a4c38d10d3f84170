//! Mercury header record and its serialization.
//!
//! Every request carries a header part holding the method name and URI.
//! The remote encodes it as a protobuf message:
//!
//! ```text
//! message Header {
//!     optional string uri = 1;
//!     optional string content_type = 2;
//!     optional string method = 3;
//!     optional sint32 status_code = 4;
//!     ...
//! }
//! ```
//!
//! [`ProtobufHeaderCodec`] writes `uri` and `method` (and `status_code` if
//! set) and skips any field it does not know when reading.

use crate::error::{MercuryError, Result};

/// Protobuf wire types.
const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

const FIELD_URI: u64 = 1;
const FIELD_METHOD: u64 = 3;
const FIELD_STATUS_CODE: u64 = 4;

/// Maximum bytes in an encoded varint.
const MAX_VARINT_LEN: usize = 10;

/// Decoded `{method, uri}` header record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MercuryHeader {
    /// Target URI, e.g. `hm://remote/user/`.
    pub uri: String,
    /// Method name ("SEND", "GET", "SUB", "UNSUB").
    pub method: String,
    /// Status code, present on replies.
    pub status_code: Option<i32>,
}

impl MercuryHeader {
    /// Create a request header.
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            method: method.to_string(),
            status_code: None,
        }
    }
}

/// Serializes headers to and from bytes.
///
/// The engine treats the encoded bytes as opaque.
pub trait HeaderCodec: Send + Sync + 'static {
    /// Encode a header into bytes.
    fn encode(&self, header: &MercuryHeader) -> Vec<u8>;

    /// Decode a header from bytes.
    fn decode(&self, bytes: &[u8]) -> Result<MercuryHeader>;
}

/// Protobuf encoding of the remote's Header message.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufHeaderCodec;

impl HeaderCodec for ProtobufHeaderCodec {
    fn encode(&self, header: &MercuryHeader) -> Vec<u8> {
        let mut buf = Vec::with_capacity(header.uri.len() + header.method.len() + 8);
        write_string(&mut buf, FIELD_URI, &header.uri);
        write_string(&mut buf, FIELD_METHOD, &header.method);
        if let Some(code) = header.status_code {
            write_varint(&mut buf, (FIELD_STATUS_CODE << 3) | WIRE_VARINT as u64);
            write_varint(&mut buf, zigzag_encode(code));
        }
        buf
    }

    fn decode(&self, bytes: &[u8]) -> Result<MercuryHeader> {
        let mut header = MercuryHeader::default();
        let mut pos = 0;

        while pos < bytes.len() {
            let key = read_varint(bytes, &mut pos)?;
            let field = key >> 3;
            let wire_type = (key & 0x07) as u8;

            match (field, wire_type) {
                (FIELD_URI, WIRE_LEN) => header.uri = read_string(bytes, &mut pos)?,
                (FIELD_METHOD, WIRE_LEN) => header.method = read_string(bytes, &mut pos)?,
                (FIELD_STATUS_CODE, WIRE_VARINT) => {
                    header.status_code = Some(zigzag_decode(read_varint(bytes, &mut pos)?));
                }
                (_, wire_type) => skip_field(bytes, &mut pos, wire_type)?,
            }
        }

        Ok(header)
    }
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn write_string(buf: &mut Vec<u8>, field: u64, value: &str) {
    write_varint(buf, (field << 3) | WIRE_LEN as u64);
    write_varint(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
}

fn zigzag_encode(value: i32) -> u64 {
    ((value << 1) ^ (value >> 31)) as u32 as u64
}

fn zigzag_decode(value: u64) -> i32 {
    let value = value as u32;
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let byte = *bytes
            .get(*pos)
            .ok_or_else(|| MercuryError::Protocol("Header varint truncated".to_string()))?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(MercuryError::Protocol("Header varint too long".to_string()))
}

fn read_len_delimited<'a>(bytes: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len = read_varint(bytes, pos)?;
    let remaining = bytes.len() - *pos;
    if len > remaining as u64 {
        return Err(MercuryError::Protocol(format!(
            "Header field length {} exceeds remaining {} bytes",
            len, remaining
        )));
    }
    let start = *pos;
    *pos += len as usize;
    Ok(&bytes[start..*pos])
}

fn read_string(bytes: &[u8], pos: &mut usize) -> Result<String> {
    let raw = read_len_delimited(bytes, pos)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| MercuryError::Protocol("Header string is not valid UTF-8".to_string()))
}

fn skip_field(bytes: &[u8], pos: &mut usize, wire_type: u8) -> Result<()> {
    let fixed = match wire_type {
        WIRE_VARINT => {
            read_varint(bytes, pos)?;
            return Ok(());
        }
        WIRE_LEN => {
            read_len_delimited(bytes, pos)?;
            return Ok(());
        }
        WIRE_FIXED64 => 8,
        WIRE_FIXED32 => 4,
        other => {
            return Err(MercuryError::Protocol(format!(
                "Unsupported header wire type {}",
                other
            )))
        }
    };
    if bytes.len() - *pos < fixed {
        return Err(MercuryError::Protocol("Header field truncated".to_string()));
    }
    *pos += fixed;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_bytes() {
        let bytes = ProtobufHeaderCodec.encode(&MercuryHeader::new("GET", "hm://a"));
        assert_eq!(
            bytes,
            vec![0x0a, 6, b'h', b'm', b':', b'/', b'/', b'a', 0x1a, 3, b'G', b'E', b'T']
        );
    }

    #[test]
    fn test_decode_recovers_fields() {
        let header = MercuryHeader::new("SUB", "hm://remote/user/alice/");
        let bytes = ProtobufHeaderCodec.encode(&header);
        assert_eq!(ProtobufHeaderCodec.decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_status_code_signed() {
        let mut header = MercuryHeader::new("GET", "hm://x");
        header.status_code = Some(-404);
        let bytes = ProtobufHeaderCodec.encode(&header);
        let decoded = ProtobufHeaderCodec.decode(&bytes).unwrap();
        assert_eq!(decoded.status_code, Some(-404));

        header.status_code = Some(200);
        let bytes = ProtobufHeaderCodec.encode(&header);
        assert_eq!(ProtobufHeaderCodec.decode(&bytes).unwrap().status_code, Some(200));
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        let mut bytes = Vec::new();
        // content_type = "text/plain" (field 2, len-delimited)
        write_string(&mut bytes, 2, "text/plain");
        // field 7, varint
        write_varint(&mut bytes, (7 << 3) | WIRE_VARINT as u64);
        write_varint(&mut bytes, 300);
        // field 8, fixed32
        write_varint(&mut bytes, (8 << 3) | WIRE_FIXED32 as u64);
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        // field 9, fixed64
        write_varint(&mut bytes, (9 << 3) | WIRE_FIXED64 as u64);
        bytes.extend_from_slice(&[0; 8]);
        write_string(&mut bytes, FIELD_URI, "hm://y");

        let header = ProtobufHeaderCodec.decode(&bytes).unwrap();
        assert_eq!(header.uri, "hm://y");
        assert!(header.method.is_empty());
    }

    #[test]
    fn test_decode_empty_is_default() {
        assert_eq!(
            ProtobufHeaderCodec.decode(&[]).unwrap(),
            MercuryHeader::default()
        );
    }

    #[test]
    fn test_decode_truncated_string() {
        // uri claims 10 bytes, only 2 present
        let bytes = [0x0a, 10, b'h', b'm'];
        let err = ProtobufHeaderCodec.decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("exceeds remaining"));
    }

    #[test]
    fn test_decode_truncated_varint() {
        let bytes = [0x0a, 0x80];
        assert!(ProtobufHeaderCodec.decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_truncated_fixed() {
        let bytes = [(9 << 3) | WIRE_FIXED64, 1, 2];
        let err = ProtobufHeaderCodec.decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let bytes = [0x0a, 2, 0xff, 0xfe];
        assert!(ProtobufHeaderCodec.decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_group_wire_type() {
        let bytes = [(5 << 3) | 3];
        assert!(ProtobufHeaderCodec.decode(&bytes).is_err());
    }

    #[test]
    fn test_varint_multi_byte() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xac, 0x02]);
        let mut pos = 0;
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), 300);
        assert_eq!(pos, 2);
    }
}
