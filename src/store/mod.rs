//! Store Module
//!
//! In-memory items behind the mock's key-value commands.
//!
//! ## Responsibilities
//! - Keyed items with flags, expiry, value and extended attributes
//! - CAS tokens: every mutation assigns a fresh, strictly increasing CAS
//! - Compare-and-swap checks for concurrent read-modify-write paths
//! - Item locks: a locked item refuses writers that do not hold its CAS
//!
//! ## Data Structure Choice
//! `HashMap` wrapped in a `parking_lot::RwLock`. The mock has no range
//! scans, so ordering buys nothing. Expiry is recorded but never enforced;
//! there is no clock to drive it. Locks do time out, on the monotonic clock.

mod table;

pub use table::ItemTable;

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::protocol::Status;

/// A stored item
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Item {
    pub flags: u32,
    pub expiry: u32,
    pub value: Vec<u8>,

    /// Extended attributes, a JSON object kept beside the value
    pub xattrs: Option<Vec<u8>>,

    /// Assigned by the table on every store
    pub cas: u64,

    /// Set while the item is locked; every store clears it
    pub locked_until: Option<Instant>,
}

impl Item {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_expiry(mut self, expiry: u32) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_xattrs(mut self, xattrs: Option<Vec<u8>>) -> Self {
        self.xattrs = xattrs;
        self
    }

    pub fn is_locked(&self) -> bool {
        self.locked_until.is_some_and(|until| Instant::now() < until)
    }

    /// Whether a writer presenting `cas` may replace this item
    ///
    /// An unlocked item admits anyone; a locked one only the lock holder.
    pub fn admits(&self, cas: u64) -> bool {
        !self.is_locked() || cas == self.cas
    }
}

/// Lock timeout used when a request asks for none or for too long
pub const DEFAULT_LOCK_TIME: Duration = Duration::from_secs(15);

/// Longest lock a request may ask for, in seconds
pub const MAX_LOCK_SECS: u32 = 29;

/// Why a store operation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    /// Key present when it must not be, or CAS mismatch
    #[error("key exists")]
    Exists,

    #[error("item not stored")]
    NotStored,

    /// Item locked by someone else, or unlock of an unlocked item
    #[error("item locked")]
    Locked,
}

impl StoreError {
    pub fn status(self) -> Status {
        match self {
            StoreError::NotFound => Status::KeyNotFound,
            StoreError::Exists => Status::KeyExists,
            StoreError::NotStored => Status::NotStored,
            StoreError::Locked => Status::TemporaryFailure,
        }
    }
}

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        err.status()
    }
}
