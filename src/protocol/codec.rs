//! Protocol codec
//!
//! Client-side encoding of requests and decoding of responses. The server
//! never uses these: it reads through the connection state machine and
//! writes [`Reply`](super::Reply) buffers. The CLI and the tests speak to
//! the server through this module.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────┬──────────┬──────────┬─────────────────────┐
//! │ Header (24)  │ Extras   │ Key      │ Value               │
//! └──────────────┴──────────┴──────────┴─────────────────────┘
//! ```

use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};

use crate::error::{MockError, Result};

use super::command::Opcode;
use super::header::{Header, DATATYPE_RAW, HEADER_SIZE, REQUEST_MAGIC, RESPONSE_MAGIC};
use super::response::Status;

/// Largest response body the client helpers accept (20 MB)
pub const MAX_RESPONSE_BODY: u32 = 20 * 1024 * 1024;

// =============================================================================
// Requests
// =============================================================================

/// A request as a client builds it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub opcode: u8,
    pub data_type: u8,
    pub vbucket: u16,
    pub opaque: u32,
    pub cas: u64,
    pub extras: Vec<u8>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Request {
    pub fn new(opcode: Opcode) -> Self {
        Self::raw(opcode as u8)
    }

    /// A request for an arbitrary opcode byte, known to this crate or not
    pub fn raw(opcode: u8) -> Self {
        Self {
            opcode,
            data_type: DATATYPE_RAW,
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Vec<u8>>) -> Self {
        self.extras = extras.into();
        self
    }

    pub fn with_opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_vbucket(mut self, vbucket: u16) -> Self {
        self.vbucket = vbucket;
        self
    }

    /// The request header this request encodes with
    pub fn header(&self) -> Header {
        Header {
            magic: REQUEST_MAGIC,
            opcode: self.opcode,
            key_length: self.key.len() as u16,
            extras_length: self.extras.len() as u8,
            data_type: self.data_type,
            vbucket_or_status: self.vbucket,
            body_length: (self.extras.len() + self.key.len() + self.value.len()) as u32,
            opaque: self.opaque,
            cas: self.cas,
        }
    }

    /// Encode header + extras + key + value
    pub fn encode(&self) -> Vec<u8> {
        let header = self.header();
        let mut out = BytesMut::with_capacity(HEADER_SIZE + header.body_length as usize);
        header.encode_into(&mut out);
        out.put_slice(&self.extras);
        out.put_slice(&self.key);
        out.put_slice(&self.value);
        out.to_vec()
    }
}

/// Extras for SET/ADD/REPLACE: flags (4) + expiry (4)
pub fn store_extras(flags: u32, expiry: u32) -> Vec<u8> {
    let mut extras = Vec::with_capacity(8);
    extras.extend_from_slice(&flags.to_be_bytes());
    extras.extend_from_slice(&expiry.to_be_bytes());
    extras
}

/// Extras for INCREMENT/DECREMENT: delta (8) + initial (8) + expiry (4)
pub fn arithmetic_extras(delta: u64, initial: u64, expiry: u32) -> Vec<u8> {
    let mut extras = Vec::with_capacity(20);
    extras.extend_from_slice(&delta.to_be_bytes());
    extras.extend_from_slice(&initial.to_be_bytes());
    extras.extend_from_slice(&expiry.to_be_bytes());
    extras
}

/// Build a single-path sub-document request
///
/// Extras are path length (2) + path flags (1), followed by doc flags (1)
/// when any are set.
pub fn subdoc_request(
    opcode: Opcode,
    key: &[u8],
    path: &str,
    value: &[u8],
    path_flags: u8,
    doc_flags: u8,
) -> Request {
    let mut extras = Vec::with_capacity(4);
    extras.extend_from_slice(&(path.len() as u16).to_be_bytes());
    extras.push(path_flags);
    if doc_flags != 0 {
        extras.push(doc_flags);
    }

    let mut body = Vec::with_capacity(path.len() + value.len());
    body.extend_from_slice(path.as_bytes());
    body.extend_from_slice(value);

    Request::new(opcode)
        .with_extras(extras)
        .with_key(key.to_vec())
        .with_value(body)
}

// =============================================================================
// Responses
// =============================================================================

/// A decoded response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub opcode: u8,
    pub status: u16,
    pub data_type: u8,
    pub opaque: u32,
    pub cas: u64,
    pub extras: Vec<u8>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Response {
    /// The status as a known [`Status`], if it is one
    pub fn status(&self) -> Option<Status> {
        Status::from_code(self.status)
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success.code()
    }
}

/// Decode one response from the front of `bytes`
///
/// Returns the response and the number of bytes it occupied.
pub fn decode_response(bytes: &[u8]) -> Result<(Response, usize)> {
    let header = Header::decode_slice(bytes)?;

    if header.magic != RESPONSE_MAGIC {
        return Err(MockError::Protocol(format!(
            "Unexpected response magic: 0x{:02x}",
            header.magic
        )));
    }

    if header.body_length > MAX_RESPONSE_BODY {
        return Err(MockError::Protocol(format!(
            "Response body too large: {} bytes (max {})",
            header.body_length, MAX_RESPONSE_BODY
        )));
    }

    let total_len = HEADER_SIZE + header.body_length as usize;
    if bytes.len() < total_len {
        return Err(MockError::Protocol(format!(
            "Incomplete response body: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    Ok((split_body(&header, &bytes[HEADER_SIZE..total_len])?, total_len))
}

fn split_body(header: &Header, body: &[u8]) -> Result<Response> {
    let extras_end = header.extras_length as usize;
    let key_end = extras_end + header.key_length as usize;
    if key_end > body.len() {
        return Err(MockError::Protocol(
            "Response key and extras exceed body length".to_string(),
        ));
    }

    Ok(Response {
        opcode: header.opcode,
        status: header.status(),
        data_type: header.data_type,
        opaque: header.opaque,
        cas: header.cas,
        extras: body[..extras_end].to_vec(),
        key: body[extras_end..key_end].to_vec(),
        value: body[key_end..].to_vec(),
    })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    writer.write_all(&request.encode())?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
///
/// Blocks until a complete response is received or an error occurs
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let mut raw = [0u8; HEADER_SIZE];
    reader.read_exact(&mut raw)?;
    let header = Header::decode(&raw);

    if header.magic != RESPONSE_MAGIC {
        return Err(MockError::Protocol(format!(
            "Unexpected response magic: 0x{:02x}",
            header.magic
        )));
    }

    if header.body_length > MAX_RESPONSE_BODY {
        return Err(MockError::Protocol(format!(
            "Response body too large: {} bytes (max {})",
            header.body_length, MAX_RESPONSE_BODY
        )));
    }

    let mut body = vec![0u8; header.body_length as usize];
    if !body.is_empty() {
        reader.read_exact(&mut body)?;
    }

    split_body(&header, &body)
}
