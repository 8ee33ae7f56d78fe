//! Inbound flow-control window accounting.
//!
//! Reads report consumed bytes one at a time; announcing every one of them
//! to the peer would flood the connection with tiny updates. Consumed bytes
//! accumulate here and are released as one increment once they reach a
//! quarter of the window.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::observability::metrics::record_window_update;
use crate::recv::WindowHandler;

/// Default stream window, the HTTP/2 initial window size.
pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;

/// A window increment to announce to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdate {
    pub stream_id: u32,
    pub increment: u32,
}

/// Consumed-but-unannounced bytes of one stream.
///
/// Lock-free; any number of readers may report into the same window.
#[derive(Debug)]
pub struct InboundWindow {
    limit: u32,
    pending: AtomicU32,
}

impl Default for InboundWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl InboundWindow {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            pending: AtomicU32::new(0),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Pending bytes at which an update is released.
    pub fn threshold(&self) -> u32 {
        (self.limit / 4).max(1)
    }

    /// Record `n` consumed bytes.
    ///
    /// Returns the increment to announce when the threshold is reached, in
    /// which case the pending count restarts from zero.
    pub fn on_read(&self, n: u32) -> Option<u32> {
        loop {
            let current = self.pending.load(Ordering::SeqCst);
            let total = current.saturating_add(n);
            let (next, release) = if total >= self.threshold() {
                (0, Some(total))
            } else {
                (total, None)
            };
            if self
                .pending
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return release;
            }
            // CAS failed, retry
        }
    }

    /// Get the pending byte count.
    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Release everything pending regardless of the threshold.
    ///
    /// Returns the previous pending count.
    pub fn reset(&self) -> u32 {
        self.pending.swap(0, Ordering::SeqCst)
    }

    /// Build a reader callback that forwards released increments for
    /// `stream_id` to `updates`.
    ///
    /// Sending never blocks. Updates for a connection that has gone away are
    /// dropped.
    pub fn handler(
        self: &Arc<Self>,
        stream_id: u32,
        updates: mpsc::UnboundedSender<WindowUpdate>,
    ) -> WindowHandler {
        let window = Arc::clone(self);
        Arc::new(move |n| {
            let n = u32::try_from(n).unwrap_or(u32::MAX);
            if let Some(increment) = window.on_read(n) {
                record_window_update(increment);
                let _ = updates.send(WindowUpdate {
                    stream_id,
                    increment,
                });
            }
        })
    }
}
