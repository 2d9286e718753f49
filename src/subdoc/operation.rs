//! Operation descriptor table
//!
//! Static legality rules for every sub-document opcode. The table is the
//! single source of truth: nothing here is computed per request, and
//! `is_lookup` is never stored, only derived from `is_mutator`.
//!
//! ```text
//! Operation      requires  multi  mutator  match  array  creative
//! ─────────────  ────────  ─────  ───────  ─────  ─────  ────────
//! Get               .        .       .       x      .       .
//! Exists            .        .       .       .      .       .
//! GetCount          .        .       .       x      .       .
//! DictAdd           x        .       x       .      .       x
//! DictUpsert        x        .       x       .      .       x
//! Remove            .        .       x       .      .       .
//! Replace           x        .       x       .      .       .
//! ArrayPrepend      x        x       x       .      x       x
//! ArrayAppend       x        x       x       .      x       x
//! ArrayInsert       x        x       x       .      x       x
//! AddUnique         x        .       x       .      x       x
//! Counter           x        .       x       x      .       x
//! ```

use serde_json::Value;

use super::SubdocError;

/// Sub-document operations, valued by their wire opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubdocOp {
    Get = 0xc5,
    Exists = 0xc6,
    DictAdd = 0xc7,
    DictUpsert = 0xc8,
    Remove = 0xc9,
    Replace = 0xca,
    ArrayAppend = 0xcb,
    ArrayPrepend = 0xcc,
    ArrayInsert = 0xcd,
    AddUnique = 0xce,
    Counter = 0xcf,
    GetCount = 0xd2,
}

impl SubdocOp {
    /// Every operation, in table order
    pub const ALL: [SubdocOp; 12] = [
        SubdocOp::Get,
        SubdocOp::Exists,
        SubdocOp::GetCount,
        SubdocOp::DictAdd,
        SubdocOp::DictUpsert,
        SubdocOp::Remove,
        SubdocOp::Replace,
        SubdocOp::ArrayPrepend,
        SubdocOp::ArrayAppend,
        SubdocOp::ArrayInsert,
        SubdocOp::AddUnique,
        SubdocOp::Counter,
    ];

    pub fn opcode(self) -> u8 {
        self as u8
    }

    pub fn descriptor(self) -> &'static OperationDescriptor {
        describe(self as u8)
    }
}

impl TryFrom<u8> for SubdocOp {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        SubdocOp::ALL
            .iter()
            .copied()
            .find(|op| *op as u8 == value)
            .ok_or(value)
    }
}

/// Legality rules of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Wire opcode; `0xff` for the sentinel
    pub opcode: u8,
    pub requires_value: bool,
    pub allows_multi_value: bool,
    pub is_mutator: bool,
    /// The reply carries the matched or resulting value
    pub returns_match: bool,
    /// The value is interpreted in an array context
    pub is_array_parent: bool,
    /// May fabricate a field or element that does not yet exist
    pub is_creative: bool,
}

/// Descriptor for any opcode outside the table
pub static INVALID: OperationDescriptor = OperationDescriptor {
    opcode: 0xff,
    requires_value: false,
    allows_multi_value: false,
    is_mutator: false,
    returns_match: false,
    is_array_parent: false,
    is_creative: false,
};

const fn row(
    op: SubdocOp,
    requires_value: bool,
    allows_multi_value: bool,
    is_mutator: bool,
    returns_match: bool,
    is_array_parent: bool,
    is_creative: bool,
) -> OperationDescriptor {
    OperationDescriptor {
        opcode: op as u8,
        requires_value,
        allows_multi_value,
        is_mutator,
        returns_match,
        is_array_parent,
        is_creative,
    }
}

static TABLE: [OperationDescriptor; 12] = [
    row(SubdocOp::Get, false, false, false, true, false, false),
    row(SubdocOp::Exists, false, false, false, false, false, false),
    row(SubdocOp::GetCount, false, false, false, true, false, false),
    row(SubdocOp::DictAdd, true, false, true, false, false, true),
    row(SubdocOp::DictUpsert, true, false, true, false, false, true),
    row(SubdocOp::Remove, false, false, true, false, false, false),
    row(SubdocOp::Replace, true, false, true, false, false, false),
    row(SubdocOp::ArrayPrepend, true, true, true, false, true, true),
    row(SubdocOp::ArrayAppend, true, true, true, false, true, true),
    row(SubdocOp::ArrayInsert, true, true, true, false, true, true),
    row(SubdocOp::AddUnique, true, false, true, false, true, true),
    row(SubdocOp::Counter, true, false, true, true, false, true),
];

/// Look up the descriptor for a wire opcode.
///
/// Unknown opcodes get [`INVALID`].
pub fn describe(opcode: u8) -> &'static OperationDescriptor {
    TABLE
        .iter()
        .find(|d| d.opcode == opcode)
        .unwrap_or(&INVALID)
}

/// A validated request value
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The operation takes no value
    Empty,
    Single(Value),
    /// Comma-separated fragments for the array operations that allow them
    Multi(Vec<Value>),
}

impl Payload {
    /// All values in insertion order
    pub fn values(&self) -> Vec<Value> {
        match self {
            Payload::Empty => Vec::new(),
            Payload::Single(v) => vec![v.clone()],
            Payload::Multi(vs) => vs.clone(),
        }
    }

    /// The single value, if there is exactly one
    pub fn single(&self) -> Option<&Value> {
        match self {
            Payload::Single(v) => Some(v),
            _ => None,
        }
    }
}

impl OperationDescriptor {
    pub fn is_lookup(&self) -> bool {
        !self.is_mutator
    }

    /// False only for the sentinel
    pub fn is_valid(&self) -> bool {
        self.opcode != INVALID.opcode
    }

    pub fn op(&self) -> Option<SubdocOp> {
        SubdocOp::try_from(self.opcode).ok()
    }

    /// Validate a request value against this operation's rules.
    ///
    /// Runs before any document is parsed. Array-parent operations read the
    /// value as a list of comma-separated JSON fragments, and more than one
    /// is accepted only when `allows_multi_value` is set. Every other
    /// operation takes exactly one JSON value.
    pub fn check_payload(&self, value: &[u8]) -> Result<Payload, SubdocError> {
        if !self.requires_value {
            if value.is_empty() {
                return Ok(Payload::Empty);
            }
            return Err(SubdocError::ValueNotAllowed);
        }

        if value.is_empty() {
            return Err(SubdocError::CantInsert);
        }

        if !self.is_array_parent {
            return serde_json::from_slice(value)
                .map(Payload::Single)
                .map_err(|_| self.malformed());
        }

        let mut wrapped = Vec::with_capacity(value.len() + 2);
        wrapped.push(b'[');
        wrapped.extend_from_slice(value);
        wrapped.push(b']');

        let mut fragments: Vec<Value> =
            serde_json::from_slice(&wrapped).map_err(|_| self.malformed())?;

        match fragments.len() {
            0 => Err(SubdocError::CantInsert),
            1 => Ok(Payload::Single(fragments.remove(0))),
            _ if self.allows_multi_value => Ok(Payload::Multi(fragments)),
            _ => Err(SubdocError::CantInsert),
        }
    }

    /// Status for a value that does not parse
    fn malformed(&self) -> SubdocError {
        if self.opcode == SubdocOp::Counter as u8 {
            SubdocError::DeltaRange
        } else {
            SubdocError::CantInsert
        }
    }
}

