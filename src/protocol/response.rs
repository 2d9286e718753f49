//! Response definitions
//!
//! Status codes and the reply a command executor hands back to a connection.

use bytes::{BufMut, Bytes, BytesMut};

use super::header::{Header, DATATYPE_RAW, HEADER_SIZE, RESPONSE_MAGIC};

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum Status {
    #[default]
    Success = 0x0000,
    KeyNotFound = 0x0001,
    KeyExists = 0x0002,
    ValueTooLarge = 0x0003,
    InvalidArguments = 0x0004,
    NotStored = 0x0005,
    DeltaBadval = 0x0006,
    NotMyVbucket = 0x0007,
    UnknownCommand = 0x0081,
    OutOfMemory = 0x0082,
    NotSupported = 0x0083,
    InternalError = 0x0084,
    Busy = 0x0085,
    TemporaryFailure = 0x0086,

    // Sub-document
    SubdocPathNotFound = 0x00c0,
    SubdocPathMismatch = 0x00c1,
    SubdocPathInvalid = 0x00c2,
    SubdocPathTooBig = 0x00c3,
    SubdocDocTooDeep = 0x00c4,
    SubdocValueCantInsert = 0x00c5,
    SubdocDocNotJson = 0x00c6,
    SubdocNumRange = 0x00c7,
    SubdocDeltaRange = 0x00c8,
    SubdocPathExists = 0x00c9,
    SubdocValueTooDeep = 0x00ca,
    SubdocInvalidCombo = 0x00cb,
    SubdocMultiPathFailure = 0x00cc,
}

impl Status {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Look up a status from its wire value
    pub fn from_code(code: u16) -> Option<Self> {
        let status = match code {
            0x0000 => Status::Success,
            0x0001 => Status::KeyNotFound,
            0x0002 => Status::KeyExists,
            0x0003 => Status::ValueTooLarge,
            0x0004 => Status::InvalidArguments,
            0x0005 => Status::NotStored,
            0x0006 => Status::DeltaBadval,
            0x0007 => Status::NotMyVbucket,
            0x0081 => Status::UnknownCommand,
            0x0082 => Status::OutOfMemory,
            0x0083 => Status::NotSupported,
            0x0084 => Status::InternalError,
            0x0085 => Status::Busy,
            0x0086 => Status::TemporaryFailure,
            0x00c0 => Status::SubdocPathNotFound,
            0x00c1 => Status::SubdocPathMismatch,
            0x00c2 => Status::SubdocPathInvalid,
            0x00c3 => Status::SubdocPathTooBig,
            0x00c4 => Status::SubdocDocTooDeep,
            0x00c5 => Status::SubdocValueCantInsert,
            0x00c6 => Status::SubdocDocNotJson,
            0x00c7 => Status::SubdocNumRange,
            0x00c8 => Status::SubdocDeltaRange,
            0x00c9 => Status::SubdocPathExists,
            0x00ca => Status::SubdocValueTooDeep,
            0x00cb => Status::SubdocInvalidCombo,
            0x00cc => Status::SubdocMultiPathFailure,
            _ => return None,
        };
        Some(status)
    }
}

/// A reply to a single request
///
/// Opcode and opaque are not stored here: they always come from the request
/// the reply answers, see [`Reply::encode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub data_type: u8,
    pub cas: u64,
    pub extras: Vec<u8>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Reply {
    /// A bare reply carrying only a status
    pub fn status(status: Status) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// A bare success reply
    pub fn success() -> Self {
        Self::status(Status::Success)
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Vec<u8>>) -> Self {
        self.extras = extras.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_data_type(mut self, data_type: u8) -> Self {
        self.data_type = data_type;
        self
    }

    /// Encode as a response to `request`, echoing its opcode and opaque
    pub fn encode(&self, request: &Header) -> Bytes {
        let body_length = self.extras.len() + self.key.len() + self.value.len();
        let mut out = BytesMut::with_capacity(HEADER_SIZE + body_length);

        let header = Header {
            magic: RESPONSE_MAGIC,
            opcode: request.opcode,
            key_length: self.key.len() as u16,
            extras_length: self.extras.len() as u8,
            data_type: if self.value.is_empty() {
                DATATYPE_RAW
            } else {
                self.data_type
            },
            vbucket_or_status: self.status.code(),
            body_length: body_length as u32,
            opaque: request.opaque,
            cas: self.cas,
        };
        header.encode_into(&mut out);
        out.put_slice(&self.extras);
        out.put_slice(&self.key);
        out.put_slice(&self.value);

        out.freeze()
    }
}
