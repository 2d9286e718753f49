//! Packet header
//!
//! The fixed 24-byte header shared by requests and responses.
//!
//! ```text
//!   Byte/     0       |       1       |       2       |       3       |
//!      +---------------+---------------+---------------+---------------+
//!     0| Magic         | Opcode        | Key length                    |
//!      +---------------+---------------+---------------+---------------+
//!     4| Extras length | Data type     | vbucket id / status           |
//!      +---------------+---------------+---------------+---------------+
//!     8| Total body length                                             |
//!      +---------------+---------------+---------------+---------------+
//!    12| Opaque                                                        |
//!      +---------------+---------------+---------------+---------------+
//!    16| CAS                                                           |
//!      |                                                               |
//!      +---------------+---------------+---------------+---------------+
//! ```
//!
//! All multi-byte fields are big-endian.

use bytes::BufMut;

use crate::error::{MockError, Result};

/// Header size in bytes
pub const HEADER_SIZE: usize = 24;

/// Magic byte of a client request
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte of a server response
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Data type bits
pub const DATATYPE_RAW: u8 = 0x00;
pub const DATATYPE_JSON: u8 = 0x01;
pub const DATATYPE_SNAPPY: u8 = 0x02;
pub const DATATYPE_XATTR: u8 = 0x04;

const DATATYPE_KNOWN: u8 = DATATYPE_JSON | DATATYPE_SNAPPY | DATATYPE_XATTR;

/// A decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub magic: u8,
    pub opcode: u8,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,

    /// vbucket id on requests, status on responses
    pub vbucket_or_status: u16,

    /// Length of extras + key + value
    pub body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl Header {
    /// Decode a header from exactly [`HEADER_SIZE`] bytes
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: bytes[0],
            opcode: bytes[1],
            key_length: u16::from_be_bytes([bytes[2], bytes[3]]),
            extras_length: bytes[4],
            data_type: bytes[5],
            vbucket_or_status: u16::from_be_bytes([bytes[6], bytes[7]]),
            body_length: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            opaque: u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            cas: u64::from_be_bytes([
                bytes[16], bytes[17], bytes[18], bytes[19], bytes[20], bytes[21], bytes[22],
                bytes[23],
            ]),
        }
    }

    /// Decode a header from the front of a slice
    pub fn decode_slice(bytes: &[u8]) -> Result<Self> {
        let fixed: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                MockError::Protocol(format!(
                    "Incomplete header: expected {} bytes, got {}",
                    HEADER_SIZE,
                    bytes.len()
                ))
            })?;
        Ok(Self::decode(fixed))
    }

    /// Append the encoded header to `out`
    pub fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_u8(self.magic);
        out.put_u8(self.opcode);
        out.put_u16(self.key_length);
        out.put_u8(self.extras_length);
        out.put_u8(self.data_type);
        out.put_u16(self.vbucket_or_status);
        out.put_u32(self.body_length);
        out.put_u32(self.opaque);
        out.put_u64(self.cas);
    }

    /// Encode into a fixed array
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        self.encode_into(&mut &mut out[..]);
        out
    }

    /// Check that a request header describes a frame this server can read.
    ///
    /// Every failure here is a framing violation: the frame boundaries of
    /// the rest of the stream can no longer be trusted.
    pub fn validate_request(&self, max_body_length: u32) -> Result<()> {
        if self.magic != REQUEST_MAGIC {
            return Err(MockError::Framing(format!(
                "Illegal magic: 0x{:02x}",
                self.magic
            )));
        }

        if self.data_type & !DATATYPE_KNOWN != 0 {
            return Err(MockError::Framing(format!(
                "Illegal data type: 0x{:02x}",
                self.data_type
            )));
        }

        if self.body_length > max_body_length {
            return Err(MockError::Framing(format!(
                "Body too large: {} bytes (max {})",
                self.body_length, max_body_length
            )));
        }

        let fixed = self.key_length as u32 + self.extras_length as u32;
        if fixed > self.body_length {
            return Err(MockError::Framing(format!(
                "Key ({}) and extras ({}) exceed body length {}",
                self.key_length, self.extras_length, self.body_length
            )));
        }

        Ok(())
    }

    /// vbucket id of a request header
    pub fn vbucket(&self) -> u16 {
        self.vbucket_or_status
    }

    /// Status of a response header
    pub fn status(&self) -> u16 {
        self.vbucket_or_status
    }
}
