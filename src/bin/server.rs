//! kvmock Server Binary
//!
//! Starts the mock key-value server.

use std::sync::Arc;
use clap::Parser;
use kvmock::{Config, Engine};
use kvmock::network::Server;
use tracing_subscriber::{fmt, EnvFilter};

/// kvmock Server
#[derive(Parser, Debug)]
#[command(name = "kvmock-server")]
#[command(about = "Mock key-value server speaking the memcached binary protocol")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:11210")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Largest request body accepted, in MB
    #[arg(short = 'b', long, default_value = "20")]
    max_body_mb: u32,

    /// Idle read timeout in milliseconds (0 = none)
    #[arg(short, long, default_value = "0")]
    read_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvmock=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("kvmock Server v{}", kvmock::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let config = Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .max_body_length(args.max_body_mb.saturating_mul(1024 * 1024))
        .read_timeout_ms(args.read_timeout_ms)
        .build();

    let engine = Arc::new(Engine::new());

    let server = match Server::new(config, engine) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
