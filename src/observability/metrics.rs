//! OpenTelemetry metrics for the transport core.
//!
//! Key metrics:
//! - sluice_mux_lock_conflicts_total: Failed shard lock attempts
//! - sluice_mux_drain_passes_total: Drain passes run
//! - sluice_mux_drain_batch_size: Getters processed per drain pass
//! - sluice_mux_getters_dropped_total: Getters discarded after a write failure
//! - sluice_mux_window_updates_total: Window increments released to peers

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Transport metrics registry.
#[derive(Debug)]
pub struct Metrics {
    pub lock_conflicts: Counter<u64>,
    pub drain_passes: Counter<u64>,
    /// Histogram of getters processed per drain pass.
    pub drain_batch_size: Histogram<u64>,
    pub getters_dropped: Counter<u64>,
    /// Number of window updates released.
    pub window_updates: Counter<u64>,
    /// Total bytes announced through window updates.
    pub window_bytes: Counter<u64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            lock_conflicts: meter
                .u64_counter("sluice_mux_lock_conflicts_total")
                .with_description("Failed shard spin lock acquisitions")
                .with_unit("1")
                .init(),
            drain_passes: meter
                .u64_counter("sluice_mux_drain_passes_total")
                .with_description("Drain passes run by shared write queues")
                .with_unit("1")
                .init(),
            drain_batch_size: meter
                .u64_histogram("sluice_mux_drain_batch_size")
                .with_description("Getters processed per drain pass")
                .with_unit("1")
                .init(),
            getters_dropped: meter
                .u64_counter("sluice_mux_getters_dropped_total")
                .with_description("Getters discarded because the connection failed")
                .with_unit("1")
                .init(),
            window_updates: meter
                .u64_counter("sluice_mux_window_updates_total")
                .with_description("Window updates released to peers")
                .with_unit("1")
                .init(),
            window_bytes: meter
                .u64_counter("sluice_mux_window_update_bytes_total")
                .with_description("Bytes announced through window updates")
                .with_unit("By")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    set_manual_provider();
                }
            }
        } else {
            // Recorded but not exported.
            set_manual_provider();
        }

        let meter = global::meter("sluice_mux");
        Metrics::new(&meter)
    });
}

fn set_manual_provider() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

pub fn record_lock_conflicts(n: u64) {
    if n == 0 {
        return;
    }
    if let Some(m) = METRICS.get() {
        m.lock_conflicts.add(n, &[]);
    }
}

/// Record one finished drain pass that processed `getters` getters.
pub fn record_drain_pass(getters: u64) {
    if let Some(m) = METRICS.get() {
        m.drain_passes.add(1, &[]);
        m.drain_batch_size.record(getters, &[]);
    }
}

pub fn record_getters_dropped(n: u64) {
    if let Some(m) = METRICS.get() {
        m.getters_dropped.add(n, &[]);
    }
}

pub fn record_window_update(increment: u32) {
    if let Some(m) = METRICS.get() {
        m.window_updates.add(1, &[]);
        m.window_bytes.add(u64::from(increment), &[]);
    }
}
