//! Test utilities for sluice-mux integration tests.
//!
//! Provides:
//! - An in-memory connection writer with failure injection
//! - A polling wait helper

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sluice_mux::mux::{ConnError, ConnWriter};

/// Shared view of everything a [`MemoryConn`] received.
#[derive(Default)]
pub struct ConnLog {
    staged: Mutex<Vec<Bytes>>,
    /// Units in flush order
    pub written: Mutex<Vec<Bytes>>,
    pub flushes: AtomicUsize,
    /// Set while a flush is in progress
    pub flushing: AtomicBool,
    pub closes: AtomicUsize,
}

impl ConnLog {
    pub fn written_units(&self) -> Vec<Bytes> {
        self.written.lock().clone()
    }

    pub fn written_count(&self) -> usize {
        self.written.lock().len()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

/// In-memory `ConnWriter`.
pub struct MemoryConn {
    pub log: Arc<ConnLog>,
    closed: bool,
    flush_delay: Option<Duration>,
    fail_flush: bool,
}

impl MemoryConn {
    pub fn new() -> (Self, Arc<ConnLog>) {
        let log = Arc::new(ConnLog::default());
        let conn = Self {
            log: Arc::clone(&log),
            closed: false,
            flush_delay: None,
            fail_flush: false,
        };
        (conn, log)
    }

    /// Make every flush take `delay`.
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = Some(delay);
        self
    }

    /// Make every flush fail.
    pub fn failing_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }
}

#[async_trait]
impl ConnWriter for MemoryConn {
    fn append(&mut self, buf: Bytes) -> Result<(), ConnError> {
        if self.closed {
            return Err(ConnError::Closed);
        }
        self.log.staged.lock().push(buf);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnError> {
        if self.closed {
            return Err(ConnError::Closed);
        }
        self.log.flushing.store(true, Ordering::SeqCst);
        if let Some(delay) = self.flush_delay {
            tokio::time::sleep(delay).await;
        }
        self.log.flushing.store(false, Ordering::SeqCst);
        if self.fail_flush {
            return Err(ConnError::Io(std::io::ErrorKind::ConnectionReset.into()));
        }
        let staged = std::mem::take(&mut *self.log.staged.lock());
        self.log.written.lock().extend(staged);
        self.log.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
