//! Flow control infrastructure.
//!
//! Provides:
//! - Coalescing of consumed bytes into window updates

pub mod window;

pub use window::{InboundWindow, WindowUpdate, DEFAULT_WINDOW_SIZE};
