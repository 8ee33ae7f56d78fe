//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via tracing
//! - OpenTelemetry metrics for queue and window activity

pub mod metrics;
pub mod tracing;
