//! sluice-mux: loopback benchmark for the transport core.
//!
//! # Usage
//!
//! ```bash
//! sluice-mux --shards 16 --producers 8 --messages 10000 --log-level info
//! ```
//!
//! Environment variables can also be used:
//! - `SLUICE_MUX_SHARDS`: Write shards per connection
//! - `SLUICE_MUX_PRODUCERS`: Concurrent producers
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use sluice_mux::config::Config;
use sluice_mux::loopback::run_loopback;
use sluice_mux::observability::metrics::init_metrics_with_endpoint;
use sluice_mux::observability::tracing::init_tracing;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  sluice-mux v{} - loopback benchmark

  Configuration:
    Address:    {}:{}
    Shards:     {}
    Producers:  {} x {} frames of {} bytes
    Window:     {} bytes
    Log Level:  {}

  Press Ctrl+C to abort.
"#,
        version,
        config.host,
        config.port,
        config.shards,
        config.producers,
        config.messages,
        config.payload_size,
        config.window_size,
        config.log_level
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse_args();

    init_tracing(&config.log_level);
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    print_banner(&config);

    tokio::select! {
        report = run_loopback(&config) => {
            let report = report?;
            tracing::info!(
                frames = report.frames,
                bytes = report.bytes,
                elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
                frames_per_sec = report.frames_per_second(),
                drain_passes = report.queue.drain_passes,
                flushes = report.queue.flushes,
                lock_conflicts = report.queue.lock_conflicts,
                window_updates = report.window_updates,
                "Loopback run complete"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT (Ctrl+C), aborting");
        }
    }

    Ok(())
}
