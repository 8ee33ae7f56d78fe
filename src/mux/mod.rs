//! Outbound write multiplexing.
//!
//! Provides:
//! - Per-shard spin locks and getter buffers
//! - The shared write queue with its single drain task
//! - The connection writer boundary

pub mod conn;
pub mod queue;
pub mod shard;
pub mod spin;

pub use conn::{ConnError, ConnWriter, IoConnWriter};
pub use queue::{MuxConfig, MuxError, QueueStats, SharedQueue};
pub use shard::BufferGetter;
