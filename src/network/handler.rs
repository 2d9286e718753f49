//! Connection Handler
//!
//! Drives one socket through a [`Connection`]: reads into the machine's
//! input target, dispatches frames, writes queued responses.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{MockError, Result};

use super::connection::{CommandExecutor, Connection};

/// How often a blocked read wakes up to look for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Size of one socket read
const READ_CHUNK: usize = 16 * 1024;

/// Handles a single client connection
pub struct ConnectionHandler {
    stream: TcpStream,

    /// Protocol state of this socket
    conn: Connection,

    executor: Arc<dyn CommandExecutor + Send + Sync>,

    /// Set when the server stops
    shutdown: Arc<AtomicBool>,

    /// Idle time after which the client is dropped (None = never)
    read_timeout: Option<Duration>,

    output_high_water: usize,

    read_buf: Vec<u8>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    ///
    /// Configures the socket: no Nagle, polling reads, write timeout
    pub fn new(
        stream: TcpStream,
        executor: Arc<dyn CommandExecutor + Send + Sync>,
        config: &Config,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        if config.write_timeout_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))?;
        }

        let read_timeout =
            (config.read_timeout_ms > 0).then(|| Duration::from_millis(config.read_timeout_ms));

        Ok(Self {
            stream,
            conn: Connection::new(peer_addr, config.max_body_length),
            executor,
            shutdown,
            read_timeout,
            output_high_water: config.output_high_water,
            read_buf: vec![0u8; READ_CHUNK],
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Returns `Ok` when the client goes away, a timeout expires, QUIT is
    /// processed or the server shuts down. Framing violations and I/O
    /// failures are returned as errors; queued output is discarded either way.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.conn.peer_addr());
        let mut last_activity = Instant::now();

        loop {
            if let Err(e) = self.flush_output() {
                return self.finish_on_write_error(e);
            }

            if self.conn.is_close_requested() {
                tracing::debug!("Client {} sent QUIT", self.conn.peer_addr());
                return Ok(());
            }

            if self.shutdown.load(Ordering::Acquire) {
                tracing::debug!("Closing {} for server shutdown", self.conn.peer_addr());
                return Ok(());
            }

            let n = match self.stream.read(&mut self.read_buf) {
                Ok(0) => {
                    tracing::debug!("Client {} disconnected", self.conn.peer_addr());
                    return Ok(());
                }
                Ok(n) => n,
                Err(ref e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    if let Some(limit) = self.read_timeout {
                        if last_activity.elapsed() >= limit {
                            tracing::debug!("Read timeout for client {}", self.conn.peer_addr());
                            return Ok(());
                        }
                    }
                    continue;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e)
                    if e.kind() == ErrorKind::ConnectionReset
                        || e.kind() == ErrorKind::ConnectionAborted =>
                {
                    tracing::debug!("Connection reset by client {}", self.conn.peer_addr());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.conn.peer_addr(), e);
                    return Err(e.into());
                }
            };

            last_activity = Instant::now();
            if let Err(e) = self.process_input(n) {
                tracing::warn!("Closing {}: {}", self.conn.peer_addr(), e);
                return Err(e);
            }
        }
    }

    /// Push the first `len` bytes of the read buffer through the machine,
    /// draining output whenever it grows past the high-water mark
    fn process_input(&mut self, len: usize) -> Result<()> {
        let mut offset = 0;

        while offset < len && !self.conn.is_close_requested() {
            let target = self.conn.current_input_target();
            if target.is_empty() {
                return Err(MockError::Framing(
                    "input arrived with no frame to receive it".to_string(),
                ));
            }

            let n = target.len().min(len - offset);
            target[..n].copy_from_slice(&self.read_buf[offset..offset + n]);
            self.conn.commit_input(n)?;
            offset += n;

            let dispatched = self.conn.advance(self.executor.as_ref())?;
            if dispatched > 0 && self.conn.pending_output_bytes() > self.output_high_water {
                self.flush_output()?;
            }
        }

        Ok(())
    }

    /// Write queued responses in order until the queue is empty
    fn flush_output(&mut self) -> Result<()> {
        while let Some(target) = self.conn.current_output_target() {
            let n = match self.stream.write(target) {
                Ok(0) => return Err(MockError::ConnectionClosed),
                Ok(n) => n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.conn.consume_output(n)?;
        }
        self.stream.flush()?;
        Ok(())
    }

    fn finish_on_write_error(&self, e: MockError) -> Result<()> {
        // The client went away before the response could be sent
        if let MockError::Io(ref io_err) = e {
            match io_err.kind() {
                ErrorKind::ConnectionAborted
                | ErrorKind::ConnectionReset
                | ErrorKind::BrokenPipe => {
                    tracing::debug!(
                        "Client {} disconnected before response could be sent: {}",
                        self.conn.peer_addr(),
                        e
                    );
                    return Ok(());
                }
                _ => {}
            }
        }
        if matches!(e, MockError::ConnectionClosed) {
            return Ok(());
        }
        tracing::warn!("Error writing to {}: {}", self.conn.peer_addr(), e);
        Err(e)
    }

    /// Frames dispatched so far
    pub fn frames_processed(&self) -> u64 {
        self.conn.frames_processed()
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        self.conn.peer_addr()
    }
}
