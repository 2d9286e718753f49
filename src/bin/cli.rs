//! kvmock CLI Client
//!
//! Command-line interface for poking a running kvmock server.

use std::net::TcpStream;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kvmock::protocol::codec::{store_extras, subdoc_request};
use kvmock::protocol::{read_response, write_request, Opcode, Request, Response};
use kvmock::Result;

/// kvmock CLI
#[derive(Parser, Debug)]
#[command(name = "kvmock-cli")]
#[command(about = "CLI for the kvmock server")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:11210")]
    server: String,

    /// Socket timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Item flags
        #[arg(short, long, default_value = "0")]
        flags: u32,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Ping the server
    Noop,

    /// Read one path inside a JSON document
    SubdocGet {
        /// Document key
        key: String,

        /// Path inside the document
        path: String,
    },

    /// Ask the server for its version
    Version,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args) {
        Ok(response) => {
            report(&response);
            if response.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<Response> {
    let request = match &args.command {
        Commands::Get { key } => Request::new(Opcode::Get).with_key(key.as_bytes()),
        Commands::Set { key, value, flags } => Request::new(Opcode::Set)
            .with_extras(store_extras(*flags, 0))
            .with_key(key.as_bytes())
            .with_value(value.as_bytes()),
        Commands::Del { key } => Request::new(Opcode::Delete).with_key(key.as_bytes()),
        Commands::Noop => Request::new(Opcode::Noop),
        Commands::SubdocGet { key, path } => {
            subdoc_request(Opcode::SubdocGet, key.as_bytes(), path, b"", 0, 0)
        }
        Commands::Version => Request::new(Opcode::Version),
    };

    let mut stream = TcpStream::connect(&args.server)?;
    let timeout = (args.timeout_ms > 0).then(|| Duration::from_millis(args.timeout_ms));
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    write_request(&mut stream, &request.with_opaque(1))?;
    read_response(&mut stream)
}

fn report(response: &Response) {
    match response.status() {
        Some(status) if status.is_success() => {
            if response.cas != 0 {
                println!("OK (cas {})", response.cas);
            } else {
                println!("OK");
            }
        }
        Some(status) => println!("{:?} (0x{:04x})", status, response.status),
        None => println!("status 0x{:04x}", response.status),
    }

    if !response.value.is_empty() {
        println!("{}", String::from_utf8_lossy(&response.value));
    }
}
