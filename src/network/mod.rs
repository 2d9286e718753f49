//! Network Module
//!
//! TCP server and per-connection protocol state.
//!
//! ## Architecture
//! - Single acceptor thread polling a nonblocking listener
//! - One thread per connection ([`ConnectionHandler`])
//! - Framing in a socket-free state machine ([`Connection`])
//! - Responses leave through a FIFO [`OutputQueue`]
//! - Frames routed through a [`CommandExecutor`]

mod server;
mod handler;
mod connection;
mod output;

pub use server::Server;
pub use handler::ConnectionHandler;
pub use connection::{CommandExecutor, Connection};
pub use output::OutputQueue;
