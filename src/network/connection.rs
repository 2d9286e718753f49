//! Framing state machine
//!
//! Turns the byte stream of one socket into command frames and queues the
//! responses they produce. Performs no I/O itself: the owner of the socket
//! fills [`Connection::current_input_target`], drains
//! [`Connection::current_output_target`] and calls [`Connection::advance`]
//! whenever new bytes may have arrived.
//!
//! ```text
//!                   24th header byte
//!  ┌────────────────┐ committed ┌──────────────┐ body complete
//!  │ AwaitingHeader │──────────►│ Body(frame)  │───────────────► executor
//!  └────────────────┘           └──────────────┘                    │
//!          ▲                                                         │
//!          └─────────────────── header_pos = 0 ◄─────────────────────┘
//! ```
//!
//! A zero-length body completes in the same `advance` call that reads the
//! header.

use std::mem;

use bytes::Bytes;

use crate::error::{MockError, Result};
use crate::protocol::{CommandFrame, Header, HEADER_SIZE};

use super::output::OutputQueue;

/// Consumer of complete frames
///
/// Called synchronously, once per frame, in arrival order. Replies go back
/// through [`Connection::enqueue_response`]; an executor may enqueue none.
pub trait CommandExecutor {
    fn execute(&self, frame: CommandFrame, conn: &mut Connection);
}

#[derive(Debug)]
enum InputState {
    AwaitingHeader,
    Body(CommandFrame),
}

/// Per-socket protocol state
#[derive(Debug)]
pub struct Connection {
    header: [u8; HEADER_SIZE],

    /// Header bytes received; fixed at [`HEADER_SIZE`] while a frame is open
    header_pos: usize,

    state: InputState,

    output: OutputQueue,

    max_body_length: u32,

    /// Peer address for logging
    peer_addr: String,

    /// Set by QUIT; no further frames are dispatched
    close_requested: bool,

    frames_processed: u64,
}

impl Connection {
    pub fn new(peer_addr: impl Into<String>, max_body_length: u32) -> Self {
        Self {
            header: [0u8; HEADER_SIZE],
            header_pos: 0,
            state: InputState::AwaitingHeader,
            output: OutputQueue::new(),
            max_body_length,
            peer_addr: peer_addr.into(),
            close_requested: false,
            frames_processed: 0,
        }
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// The region the transport should fill next
    ///
    /// Unfilled header bytes while awaiting a header, otherwise the unfilled
    /// part of the open frame's body. Empty when a complete frame or header
    /// is waiting for [`Self::advance`].
    pub fn current_input_target(&mut self) -> &mut [u8] {
        match &mut self.state {
            InputState::AwaitingHeader => &mut self.header[self.header_pos..],
            InputState::Body(frame) => frame.remaining_mut(),
        }
    }

    /// Record that `n` bytes were written into the current input target
    pub fn commit_input(&mut self, n: usize) -> Result<()> {
        match &mut self.state {
            InputState::AwaitingHeader => {
                if self.header_pos + n > HEADER_SIZE {
                    return Err(MockError::Framing(format!(
                        "{} bytes committed with {} header bytes outstanding",
                        n,
                        HEADER_SIZE - self.header_pos
                    )));
                }
                self.header_pos += n;
                Ok(())
            }
            InputState::Body(frame) => frame.commit(n),
        }
    }

    /// Move the machine forward.
    ///
    /// Opens a frame once the header is full, and dispatches it to
    /// `executor` once its body is complete. Returns the number of frames
    /// dispatched (0 or 1). A header that fails validation is a framing
    /// violation; the connection must be closed.
    pub fn advance<E>(&mut self, executor: &E) -> Result<usize>
    where
        E: CommandExecutor + ?Sized,
    {
        if self.close_requested {
            return Ok(0);
        }

        if self.header_pos == HEADER_SIZE && matches!(self.state, InputState::AwaitingHeader) {
            let header = Header::decode(&self.header);
            if let Err(e) = header.validate_request(self.max_body_length) {
                tracing::warn!("Rejecting frame from {}: {}", self.peer_addr, e);
                return Err(e);
            }
            tracing::trace!(
                "Header from {}: opcode=0x{:02x} body_length={} opaque={}",
                self.peer_addr,
                header.opcode,
                header.body_length,
                header.opaque
            );
            self.state = InputState::Body(CommandFrame::new(header));
        }

        match mem::replace(&mut self.state, InputState::AwaitingHeader) {
            InputState::Body(frame) if frame.is_complete() => {
                self.header_pos = 0;
                self.frames_processed += 1;
                executor.execute(frame, self);
                Ok(1)
            }
            other => {
                self.state = other;
                Ok(0)
            }
        }
    }

    /// Push a chunk of received bytes through the machine
    ///
    /// Returns the number of frames dispatched. The result does not depend
    /// on how the stream is split into chunks. Bytes after a close request
    /// are ignored.
    pub fn feed<E>(&mut self, mut bytes: &[u8], executor: &E) -> Result<usize>
    where
        E: CommandExecutor + ?Sized,
    {
        let mut dispatched = 0;

        loop {
            dispatched += self.advance(executor)?;
            if bytes.is_empty() || self.close_requested {
                return Ok(dispatched);
            }

            let target = self.current_input_target();
            if target.is_empty() {
                return Err(MockError::Framing(
                    "input arrived with no frame to receive it".to_string(),
                ));
            }

            let n = target.len().min(bytes.len());
            target[..n].copy_from_slice(&bytes[..n]);
            self.commit_input(n)?;
            bytes = &bytes[n..];
        }
    }

    /// True when no header byte of the next frame has arrived
    pub fn is_awaiting_header(&self) -> bool {
        self.header_pos == 0 && matches!(self.state, InputState::AwaitingHeader)
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Queue a response behind every response queued before it
    pub fn enqueue_response(&mut self, response: Bytes) {
        self.output.push(response);
    }

    /// Unsent remainder of the oldest response, `None` when idle
    pub fn current_output_target(&self) -> Option<&[u8]> {
        self.output.head()
    }

    /// Record that the transport wrote `n` bytes of the current output target
    pub fn consume_output(&mut self, n: usize) -> Result<()> {
        self.output.consume(n)
    }

    pub fn has_pending_output(&self) -> bool {
        self.output.has_pending()
    }

    pub fn pending_output_bytes(&self) -> usize {
        self.output.pending_bytes()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop dispatching; the owner closes the socket once output drains
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
