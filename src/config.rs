//! Configuration parsing for the sluice-mux loopback benchmark.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for a quick local run

use clap::Parser;

use crate::flow::DEFAULT_WINDOW_SIZE;
use crate::mux::MuxConfig;

/// sluice-mux: sharded write multiplexing over a loopback connection.
#[derive(Parser, Debug, Clone)]
#[command(name = "sluice-mux")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind the loopback listener to
    #[arg(long, env = "SLUICE_MUX_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, env = "SLUICE_MUX_PORT", default_value_t = 0)]
    pub port: u16,

    /// Number of write shards per connection
    #[arg(long, env = "SLUICE_MUX_SHARDS", default_value_t = 16)]
    pub shards: usize,

    /// Initial capacity of each shard buffer
    #[arg(long, env = "SLUICE_MUX_SWAP_CAPACITY", default_value_t = 64)]
    pub swap_capacity: usize,

    /// Inbound stream window in bytes
    #[arg(long, env = "SLUICE_MUX_WINDOW_SIZE", default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window_size: u32,

    /// Number of concurrent producers
    #[arg(long, env = "SLUICE_MUX_PRODUCERS", default_value_t = 8)]
    pub producers: usize,

    /// Frames written by each producer
    #[arg(long, env = "SLUICE_MUX_MESSAGES", default_value_t = 10_000)]
    pub messages: usize,

    /// Payload size of each frame in bytes
    #[arg(long, env = "SLUICE_MUX_PAYLOAD_SIZE", default_value_t = 256)]
    pub payload_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Queue settings for each connection.
    pub fn mux(&self) -> MuxConfig {
        MuxConfig {
            shards: self.shards,
            swap_capacity: self.swap_capacity,
        }
    }

    /// A small configuration for tests.
    pub fn test_config() -> Self {
        Self {
            producers: 3,
            messages: 100,
            payload_size: 32,
            shards: 4,
            log_level: "debug".into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            shards: 16,
            swap_capacity: 64,
            window_size: DEFAULT_WINDOW_SIZE,
            producers: 8,
            messages: 10_000,
            payload_size: 256,
            log_level: "info".into(),
            otel_endpoint: None,
        }
    }
}
