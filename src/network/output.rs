//! Connection output queue
//!
//! Strict FIFO of encoded responses waiting for the transport.
//!
//! ```text
//!            head_offset
//!                 │
//!   front ┌───────▼──────────┐ ┌──────────┐ ┌──────┐ back
//!         │ sent  │ unsent   │ │ R2       │ │ R3   │
//!         └──────────────────┘ └──────────┘ └──────┘
//! ```
//!
//! The head is popped only once every byte of it has been consumed. Buffers
//! are never reordered, split or merged; the transport may still write one
//! in several pieces.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::{MockError, Result};

/// Pending responses of one connection
#[derive(Debug, Default)]
pub struct OutputQueue {
    buffers: VecDeque<Bytes>,

    /// Bytes of the head already transmitted
    head_offset: usize,

    /// Unsent bytes across every buffer
    pending_bytes: usize,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a response to the tail. Empty buffers carry nothing and are
    /// not queued.
    pub fn push(&mut self, response: Bytes) {
        if response.is_empty() {
            return;
        }
        self.pending_bytes += response.len();
        self.buffers.push_back(response);
    }

    pub fn has_pending(&self) -> bool {
        !self.buffers.is_empty()
    }

    /// Unsent remainder of the head response
    pub fn head(&self) -> Option<&[u8]> {
        self.buffers.front().map(|b| &b[self.head_offset..])
    }

    /// Record that the transport wrote `n` bytes of the head
    pub fn consume(&mut self, n: usize) -> Result<()> {
        let remaining = match self.buffers.front() {
            Some(head) => head.len() - self.head_offset,
            None if n == 0 => return Ok(()),
            None => {
                return Err(MockError::Framing(format!(
                    "{} bytes consumed from an empty output queue",
                    n
                )))
            }
        };

        if n > remaining {
            return Err(MockError::Framing(format!(
                "{} bytes consumed but only {} remain in the head response",
                n, remaining
            )));
        }

        self.head_offset += n;
        self.pending_bytes -= n;
        if n == remaining {
            self.buffers.pop_front();
            self.head_offset = 0;
        }
        Ok(())
    }

    /// Number of queued responses, including a partially sent head
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Drop everything, sent or not
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.head_offset = 0;
        self.pending_bytes = 0;
    }
}
