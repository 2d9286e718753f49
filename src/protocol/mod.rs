//! Protocol Module
//!
//! The memcached binary protocol, as spoken by the mock.
//!
//! ## Packet Format
//!
//! ```text
//! ┌──────────────┬──────────┬──────────┬─────────────────────┐
//! │ Header (24)  │ Extras   │ Key      │ Value               │
//! └──────────────┴──────────┴──────────┴─────────────────────┘
//! ```
//!
//! Requests carry magic `0x80` and a vbucket id; responses carry magic
//! `0x81` and a status in the same two bytes. The header's total body
//! length covers extras, key and value.
//!
//! ### Sub-document Extras
//! - single path: path_len (2) + path flags (1) [+ expiry (4)] [+ doc flags (1)]
//! - multi path:  [expiry (4)] [+ doc flags (1)]

mod header;
mod command;
mod response;
pub mod codec;

pub use header::{
    Header, DATATYPE_JSON, DATATYPE_RAW, DATATYPE_SNAPPY, DATATYPE_XATTR, HEADER_SIZE,
    REQUEST_MAGIC, RESPONSE_MAGIC,
};
pub use command::{CommandFrame, Opcode};
pub use response::{Reply, Status};
pub use codec::{decode_response, read_response, write_request, Request, Response};
