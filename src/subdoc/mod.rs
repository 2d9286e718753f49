//! Sub-document Module
//!
//! Reading and mutating a single path inside a stored JSON document.
//!
//! ## Responsibilities
//! - Static legality rules per opcode ([`operation`])
//! - Path parsing ([`path`])
//! - Applying an operation to a parsed document ([`executor`])
//!
//! ## Flags
//! Path flags travel per path, doc flags per request:
//! - `PATH_FLAG_MKDIR_P`   create missing intermediate dictionaries
//! - `PATH_FLAG_XATTR`     the path addresses extended attributes
//! - `DOC_FLAG_MKDOC`      create the document if it is missing
//! - `DOC_FLAG_ADD`        create the document, fail if it exists

pub mod operation;
pub mod path;
pub mod executor;

pub use executor::{execute, root_template, Outcome};
pub use operation::{describe, OperationDescriptor, Payload, SubdocOp, INVALID};
pub use path::{Component, Path, MAX_DEPTH};

use thiserror::Error;

use crate::protocol::Status;

pub const PATH_FLAG_MKDIR_P: u8 = 0x01;
pub const PATH_FLAG_XATTR: u8 = 0x04;

pub const DOC_FLAG_MKDOC: u8 = 0x01;
pub const DOC_FLAG_ADD: u8 = 0x02;
pub const DOC_FLAG_CREATE_MASK: u8 = DOC_FLAG_MKDOC | DOC_FLAG_ADD;

/// Per-request failure of a sub-document operation
///
/// Never fatal to a connection; each variant maps to one reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubdocError {
    #[error("path not found")]
    PathNotFound,

    #[error("path component type does not match the document")]
    PathMismatch,

    #[error("invalid path")]
    PathInvalid,

    #[error("path too deep")]
    PathTooBig,

    #[error("path already exists")]
    PathExists,

    #[error("value cannot be inserted")]
    CantInsert,

    #[error("document is not JSON")]
    DocNotJson,

    #[error("existing number out of range")]
    NumRange,

    #[error("delta out of range")]
    DeltaRange,

    #[error("operation does not take a value")]
    ValueNotAllowed,
}

impl SubdocError {
    pub fn status(self) -> Status {
        match self {
            SubdocError::PathNotFound => Status::SubdocPathNotFound,
            SubdocError::PathMismatch => Status::SubdocPathMismatch,
            SubdocError::PathInvalid => Status::SubdocPathInvalid,
            SubdocError::PathTooBig => Status::SubdocPathTooBig,
            SubdocError::PathExists => Status::SubdocPathExists,
            SubdocError::CantInsert => Status::SubdocValueCantInsert,
            SubdocError::DocNotJson => Status::SubdocDocNotJson,
            SubdocError::NumRange => Status::SubdocNumRange,
            SubdocError::DeltaRange => Status::SubdocDeltaRange,
            SubdocError::ValueNotAllowed => Status::InvalidArguments,
        }
    }
}

impl From<SubdocError> for Status {
    fn from(err: SubdocError) -> Self {
        err.status()
    }
}
