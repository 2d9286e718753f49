//! # kvmock
//!
//! A behavioral mock of a clustered key-value server, for exercising client
//! libraries against real wire protocols without a live cluster:
//! - Memcached binary protocol with the sub-document extension
//! - Per-socket framing state machine with a FIFO output queue
//! - Static descriptor table for sub-document operations
//! - Fault injection for the mock query service
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │               (one thread per connection)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ bytes
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Connection                               │
//! │        header ──► body ──► CommandFrame ──► OutputQueue      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ CommandExecutor
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Engine                                 │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐           ┌─────────────────┐
//!   │   ItemTable     │           │     Subdoc      │
//!   │ (RwLock + CAS)  │           │ (descriptors)   │
//!   └─────────────────┘           └─────────────────┘
//!
//!   QueryService ──► ErrorState gate ──► canned rows
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod subdoc;
pub mod store;
pub mod network;
pub mod engine;
pub mod query;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{MockError, Result};
pub use config::Config;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvmock
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
