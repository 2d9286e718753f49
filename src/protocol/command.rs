//! Command definitions
//!
//! Opcodes understood by the mock and the frame a request is read into.

use crate::error::{MockError, Result};

use super::header::Header;

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Quit = 0x07,
    Flush = 0x08,
    GetQ = 0x09,
    Noop = 0x0a,
    Version = 0x0b,
    GetK = 0x0c,
    GetKQ = 0x0d,
    Append = 0x0e,
    Prepend = 0x0f,
    Stat = 0x10,
    SetQ = 0x11,
    AddQ = 0x12,
    ReplaceQ = 0x13,
    DeleteQ = 0x14,
    IncrementQ = 0x15,
    DecrementQ = 0x16,
    QuitQ = 0x17,
    FlushQ = 0x18,
    AppendQ = 0x19,
    PrependQ = 0x1a,
    Verbosity = 0x1b,
    Touch = 0x1c,
    Gat = 0x1d,
    GatQ = 0x1e,
    Hello = 0x1f,

    // Item locks and sampling
    GetLocked = 0x94,
    UnlockKey = 0x95,
    GetRandom = 0xb6,

    // Sub-document
    SubdocGet = 0xc5,
    SubdocExists = 0xc6,
    SubdocDictAdd = 0xc7,
    SubdocDictUpsert = 0xc8,
    SubdocDelete = 0xc9,
    SubdocReplace = 0xca,
    SubdocArrayPushLast = 0xcb,
    SubdocArrayPushFirst = 0xcc,
    SubdocArrayInsert = 0xcd,
    SubdocArrayAddUnique = 0xce,
    SubdocCounter = 0xcf,
    SubdocMultiLookup = 0xd0,
    SubdocMultiMutation = 0xd1,
    SubdocGetCount = 0xd2,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        let opcode = match value {
            0x00 => Opcode::Get,
            0x01 => Opcode::Set,
            0x02 => Opcode::Add,
            0x03 => Opcode::Replace,
            0x04 => Opcode::Delete,
            0x05 => Opcode::Increment,
            0x06 => Opcode::Decrement,
            0x07 => Opcode::Quit,
            0x08 => Opcode::Flush,
            0x09 => Opcode::GetQ,
            0x0a => Opcode::Noop,
            0x0b => Opcode::Version,
            0x0c => Opcode::GetK,
            0x0d => Opcode::GetKQ,
            0x0e => Opcode::Append,
            0x0f => Opcode::Prepend,
            0x10 => Opcode::Stat,
            0x11 => Opcode::SetQ,
            0x12 => Opcode::AddQ,
            0x13 => Opcode::ReplaceQ,
            0x14 => Opcode::DeleteQ,
            0x15 => Opcode::IncrementQ,
            0x16 => Opcode::DecrementQ,
            0x17 => Opcode::QuitQ,
            0x18 => Opcode::FlushQ,
            0x19 => Opcode::AppendQ,
            0x1a => Opcode::PrependQ,
            0x1b => Opcode::Verbosity,
            0x1c => Opcode::Touch,
            0x1d => Opcode::Gat,
            0x1e => Opcode::GatQ,
            0x1f => Opcode::Hello,
            0x94 => Opcode::GetLocked,
            0x95 => Opcode::UnlockKey,
            0xb6 => Opcode::GetRandom,
            0xc5 => Opcode::SubdocGet,
            0xc6 => Opcode::SubdocExists,
            0xc7 => Opcode::SubdocDictAdd,
            0xc8 => Opcode::SubdocDictUpsert,
            0xc9 => Opcode::SubdocDelete,
            0xca => Opcode::SubdocReplace,
            0xcb => Opcode::SubdocArrayPushLast,
            0xcc => Opcode::SubdocArrayPushFirst,
            0xcd => Opcode::SubdocArrayInsert,
            0xce => Opcode::SubdocArrayAddUnique,
            0xcf => Opcode::SubdocCounter,
            0xd0 => Opcode::SubdocMultiLookup,
            0xd1 => Opcode::SubdocMultiMutation,
            0xd2 => Opcode::SubdocGetCount,
            other => return Err(other),
        };
        Ok(opcode)
    }
}

impl Opcode {
    /// Quiet variants suppress the reply on success (and on miss for gets)
    pub fn is_quiet(&self) -> bool {
        matches!(
            self,
            Opcode::GetQ
                | Opcode::GetKQ
                | Opcode::SetQ
                | Opcode::AddQ
                | Opcode::ReplaceQ
                | Opcode::DeleteQ
                | Opcode::IncrementQ
                | Opcode::DecrementQ
                | Opcode::QuitQ
                | Opcode::FlushQ
                | Opcode::AppendQ
                | Opcode::PrependQ
                | Opcode::GatQ
        )
    }

    /// Map a quiet opcode to its loud counterpart
    pub fn to_non_quiet(self) -> Self {
        match self {
            Opcode::GetQ => Opcode::Get,
            Opcode::GetKQ => Opcode::GetK,
            Opcode::SetQ => Opcode::Set,
            Opcode::AddQ => Opcode::Add,
            Opcode::ReplaceQ => Opcode::Replace,
            Opcode::DeleteQ => Opcode::Delete,
            Opcode::IncrementQ => Opcode::Increment,
            Opcode::DecrementQ => Opcode::Decrement,
            Opcode::QuitQ => Opcode::Quit,
            Opcode::FlushQ => Opcode::Flush,
            Opcode::AppendQ => Opcode::Append,
            Opcode::PrependQ => Opcode::Prepend,
            Opcode::GatQ => Opcode::Gat,
            other => other,
        }
    }

    /// Whether this is one of the single-path sub-document opcodes
    pub fn is_subdoc_single(&self) -> bool {
        matches!(*self as u8, 0xc5..=0xcf | 0xd2)
    }
}

/// A request frame: a validated header plus the body it declares.
///
/// The body is allocated up front at exactly `body_length` bytes and filled
/// by the transport through [`CommandFrame::remaining_mut`].
#[derive(Debug, Clone)]
pub struct CommandFrame {
    header: Header,
    body: Vec<u8>,
    filled: usize,
}

impl CommandFrame {
    /// Allocate a frame for a header that has already been validated
    pub fn new(header: Header) -> Self {
        Self {
            header,
            body: vec![0u8; header.body_length as usize],
            filled: 0,
        }
    }

    /// Build a complete frame from a header and its full body
    pub fn from_parts(header: Header, body: Vec<u8>) -> Result<Self> {
        if body.len() != header.body_length as usize {
            return Err(MockError::Framing(format!(
                "Body length mismatch: header declares {}, got {}",
                header.body_length,
                body.len()
            )));
        }
        if header.key_length as usize + header.extras_length as usize > body.len() {
            return Err(MockError::Framing(
                "Key and extras exceed body length".to_string(),
            ));
        }
        let filled = body.len();
        Ok(Self {
            header,
            body,
            filled,
        })
    }

    /// True once every declared body byte has arrived
    pub fn is_complete(&self) -> bool {
        self.filled == self.body.len()
    }

    /// The part of the body still waiting for bytes
    pub fn remaining_mut(&mut self) -> &mut [u8] {
        &mut self.body[self.filled..]
    }

    /// Record that `n` bytes were written into [`Self::remaining_mut`]
    pub fn commit(&mut self, n: usize) -> Result<()> {
        let remaining = self.body.len() - self.filled;
        if n > remaining {
            return Err(MockError::Framing(format!(
                "{} bytes committed to a frame with {} bytes outstanding",
                n, remaining
            )));
        }
        self.filled += n;
        Ok(())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Raw opcode byte
    pub fn opcode(&self) -> u8 {
        self.header.opcode
    }

    pub fn opaque(&self) -> u32 {
        self.header.opaque
    }

    pub fn cas(&self) -> u64 {
        self.header.cas
    }

    pub fn vbucket(&self) -> u16 {
        self.header.vbucket()
    }

    pub fn body(&self) -> &[u8] {
        &self.body[..self.filled]
    }

    pub fn extras(&self) -> &[u8] {
        &self.body[..self.extras_end()]
    }

    pub fn key(&self) -> &[u8] {
        &self.body[self.extras_end()..self.key_end()]
    }

    pub fn value(&self) -> &[u8] {
        &self.body[self.key_end()..]
    }

    fn extras_end(&self) -> usize {
        self.header.extras_length as usize
    }

    fn key_end(&self) -> usize {
        self.extras_end() + self.header.key_length as usize
    }
}
