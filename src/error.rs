//! Error types for kvmock
//!
//! Provides a unified error type for all operations.
//!
//! Only conditions that end a connection or a process are errors here.
//! Per-request failures (bad arguments, missing keys, sub-document path
//! errors, injected faults) are protocol statuses carried in a reply.

use thiserror::Error;

/// Result type alias using MockError
pub type Result<T> = std::result::Result<T, MockError>;

/// Unified error type for kvmock operations
#[derive(Debug, Error)]
pub enum MockError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Framing Errors (fatal to the connection)
    // -------------------------------------------------------------------------
    #[error("Framing violation: {0}")]
    Framing(String),

    #[error("Connection closed")]
    ConnectionClosed,

    // -------------------------------------------------------------------------
    // Protocol Errors (client-side decoding)
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MockError {
    /// Whether the error ends the connection it occurred on.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            MockError::Io(_) | MockError::Framing(_) | MockError::ConnectionClosed
        )
    }
}
