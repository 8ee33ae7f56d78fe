//! sluice-mux: the transport concurrency core of an RPC framework.
//!
//! Many logical streams share one physical connection. Outbound, callers
//! hand deferred writes to a sharded queue that a single drain task batches
//! onto the connection. Inbound, each stream's data is queued in arrival
//! order and read through a blocking reader that reports consumed bytes for
//! flow control.
//!
//! # Modules
//!
//! - [`mux`]: Sharded write multiplexing and the connection writer boundary
//! - [`recv`]: Inbound buffering, blocking reads and cancellation
//! - [`stream`]: Per-call reader facade
//! - [`flow`]: Window update coalescing
//! - [`config`]: CLI and environment configuration
//! - [`loopback`]: End-to-end loopback benchmark
//! - [`observability`]: Metrics and tracing setup

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // mux::MuxConfig is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::len_without_is_empty,    // Readers expose len for buffered bytes
    clippy::cast_possible_truncation // Frame lengths are bounded by config
)]

pub mod config;
pub mod flow;
pub mod loopback;
pub mod mux;
pub mod observability;
pub mod recv;
pub mod stream;

pub use mux::{BufferGetter, ConnWriter, MuxConfig, SharedQueue};
pub use recv::{CallContext, RecvBuffer, RecvMsg, StreamError};
pub use stream::Stream;
