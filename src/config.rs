//! Configuration for kvmock
//!
//! Centralized configuration with sensible defaults.

use crate::error::{MockError, Result};

/// Main configuration for a kvmock instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = block forever)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = block forever)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Largest body a request header may declare (in bytes).
    /// Anything larger is a framing violation and closes the connection.
    pub max_body_length: u32,

    /// Queued response bytes above which a connection stops reading input
    pub output_high_water: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:11210".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
            max_body_length: 20 * 1024 * 1024, // 20 MB
            output_high_water: 4 * 1024 * 1024, // 4 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration for values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(MockError::Config("listen address is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(MockError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.output_high_water == 0 {
            return Err(MockError::Config(
                "output_high_water must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the largest body length a request may declare
    pub fn max_body_length(mut self, bytes: u32) -> Self {
        self.config.max_body_length = bytes;
        self
    }

    /// Set the output back-pressure threshold (in bytes)
    pub fn output_high_water(mut self, bytes: usize) -> Self {
        self.config.output_high_water = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
