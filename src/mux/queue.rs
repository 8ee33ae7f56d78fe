//! Sharded write multiplexer.
//!
//! Callers hand deferred write producers ("getters") to [`SharedQueue::add`].
//! Getters are spread round-robin over a fixed number of shards so that
//! concurrent callers rarely touch the same lock. A single drain task per
//! queue swaps each pending shard out, invokes its getters, stages the bytes
//! on the connection writer and flushes once per pass.
//!
//! Scheduling uses two atomics:
//! - `trigger` counts "shard became non-empty" events not yet drained. Only
//!   the caller that moves it from 0 to 1 starts a drain.
//! - `running` admits one drain task at a time. After a pass the task clears
//!   it and re-reads `trigger`; work that arrived while the flag was still set
//!   is picked up by that re-check.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;

use super::conn::{ConnError, ConnWriter};
use super::shard::{BufferGetter, ShardStore};
use crate::observability::metrics::{
    record_drain_pass, record_getters_dropped, record_lock_conflicts,
};

/// Error type for queue construction.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("shard count must be at least 1")]
    InvalidShardCount,

    #[error("no tokio runtime available to run drain tasks")]
    NoRuntime,
}

/// Configuration for a shared write queue.
#[derive(Debug, Clone, Copy)]
pub struct MuxConfig {
    /// Number of independent shards
    pub shards: usize,
    /// Initial capacity of each shard buffer and of the swap buffer
    pub swap_capacity: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            shards: 16,
            swap_capacity: 64,
        }
    }
}

impl MuxConfig {
    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards,
            ..Self::default()
        }
    }
}

/// Snapshot of queue instrumentation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Failed shard lock attempts
    pub lock_conflicts: u64,
    /// Worklist entries whose shard was already empty when swapped
    pub zero_shards: u64,
    pub drain_passes: u64,
    pub flushes: u64,
    pub getters_invoked: u64,
    /// Getters discarded without being invoked because the connection failed
    pub getters_dropped: u64,
    /// Highest number of drain passes observed running at once
    pub max_active_drains: usize,
}

#[derive(Debug, Default)]
struct Counters {
    zero_shards: AtomicU64,
    drain_passes: AtomicU64,
    flushes: AtomicU64,
    getters_invoked: AtomicU64,
    getters_dropped: AtomicU64,
    active_drains: AtomicUsize,
    max_active_drains: AtomicUsize,
    reported_conflicts: AtomicU64,
}

/// State owned by whichever drain pass is active.
struct DrainState<W> {
    writer: W,
    swap: Vec<BufferGetter>,
}

struct Inner<W> {
    idx: AtomicUsize,
    shards: ShardStore,
    worklist: parking_lot::Mutex<VecDeque<usize>>,
    trigger: AtomicUsize,
    running: AtomicBool,
    closed: AtomicBool,
    // Never contended while `running` admits a single pass; `close` is the
    // only other locker.
    drain: tokio::sync::Mutex<DrainState<W>>,
    runtime: Handle,
    counters: Counters,
}

/// Multiplexes writes from many callers onto one connection.
///
/// Cloning is cheap; all clones share the same shards and drain task.
pub struct SharedQueue<W> {
    inner: Arc<Inner<W>>,
}

impl<W> Clone for SharedQueue<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: ConnWriter> SharedQueue<W> {
    /// Create a queue whose drain tasks run on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.shards` is zero or no runtime is entered.
    pub fn new(config: MuxConfig, writer: W) -> Result<Self, MuxError> {
        let runtime = Handle::try_current().map_err(|_| MuxError::NoRuntime)?;
        Self::with_handle(config, writer, runtime)
    }

    /// Create a queue whose drain tasks run on `runtime`.
    pub fn with_handle(config: MuxConfig, writer: W, runtime: Handle) -> Result<Self, MuxError> {
        if config.shards == 0 {
            return Err(MuxError::InvalidShardCount);
        }
        let inner = Inner {
            idx: AtomicUsize::new(0),
            shards: ShardStore::new(config.shards, config.swap_capacity),
            worklist: parking_lot::Mutex::new(VecDeque::with_capacity(config.shards + 1)),
            trigger: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            drain: tokio::sync::Mutex::new(DrainState {
                writer,
                swap: Vec::with_capacity(config.swap_capacity),
            }),
            runtime,
            counters: Counters::default(),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Enqueue getters for the next drain pass.
    ///
    /// Blocks only for one shard lock acquisition. Write failures are not
    /// reported here; they close the connection.
    pub fn add<I>(&self, getters: I)
    where
        I: IntoIterator<Item = BufferGetter>,
    {
        let shard = self.inner.idx.fetch_add(1, Ordering::Relaxed) % self.inner.shards.size();
        if self.inner.shards.append(shard, getters) {
            self.trigger(shard);
        }
    }

    /// Enqueue a single getter.
    pub fn add_one(&self, getter: BufferGetter) {
        self.add(std::iter::once(getter));
    }

    /// Record that `shard` has work and start a drain if none is scheduled.
    fn trigger(&self, shard: usize) {
        // The worklist entry must exist before the count that covers it.
        self.inner.worklist.lock().push_back(shard);
        if self.inner.trigger.fetch_add(1, Ordering::SeqCst) > 0 {
            return;
        }
        self.for_each();
    }

    /// Spawn a drain task unless one is already running.
    fn for_each(&self) {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            inner.run().await;
        });
    }

    /// Close the underlying connection.
    ///
    /// Waits for an in-flight drain pass to finish with the writer first.
    pub async fn close(&self) {
        let mut state = self.inner.drain.lock().await;
        state.writer.close().await;
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    /// Whether the connection has been closed, by `close` or by a write failure.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Shard "became non-empty" events not yet drained.
    pub fn pending(&self) -> usize {
        self.inner.trigger.load(Ordering::SeqCst)
    }

    /// True when no work is pending and no drain task is running.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0 && !self.inner.running.load(Ordering::SeqCst)
    }

    pub fn shard_count(&self) -> usize {
        self.inner.shards.size()
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.inner.counters;
        QueueStats {
            lock_conflicts: self.inner.shards.lock_conflicts(),
            zero_shards: c.zero_shards.load(Ordering::Relaxed),
            drain_passes: c.drain_passes.load(Ordering::Relaxed),
            flushes: c.flushes.load(Ordering::Relaxed),
            getters_invoked: c.getters_invoked.load(Ordering::Relaxed),
            getters_dropped: c.getters_dropped.load(Ordering::Relaxed),
            max_active_drains: c.max_active_drains.load(Ordering::Relaxed),
        }
    }
}

impl<W: ConnWriter> Inner<W> {
    /// Body of a drain task. Entered with `running` set.
    async fn run(self: Arc<Self>) {
        loop {
            self.drain_pass().await;

            // quit & check again
            self.running.store(false, Ordering::SeqCst);
            if self.trigger.load(Ordering::SeqCst) == 0 {
                return;
            }
            if self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // A racing `add` already started the next task.
                return;
            }
        }
    }

    async fn drain_pass(&self) {
        let c = &self.counters;
        let active = c.active_drains.fetch_add(1, Ordering::SeqCst) + 1;
        c.max_active_drains.fetch_max(active, Ordering::SeqCst);
        c.drain_passes.fetch_add(1, Ordering::Relaxed);

        let mut state = self.drain.lock().await;
        let DrainState { writer, swap } = &mut *state;
        let mut shards = 0usize;
        let mut getters = 0usize;

        while self.trigger.load(Ordering::SeqCst) > 0 {
            // Every counted trigger was preceded by its worklist entry.
            let next = self.worklist.lock().pop_front();
            debug_assert!(next.is_some(), "trigger counted without a worklist entry");
            let Some(shard) = next else {
                tracing::error!("Drain worklist empty with triggers pending");
                break;
            };

            self.shards.swap(shard, swap);
            if swap.is_empty() {
                c.zero_shards.fetch_add(1, Ordering::Relaxed);
            }
            getters += swap.len();
            self.deal(writer, swap).await;
            shards += 1;

            self.trigger.fetch_sub(1, Ordering::SeqCst);
        }

        self.flush(writer).await;
        drop(state);

        let conflicts = self.shards.lock_conflicts();
        let reported = c.reported_conflicts.swap(conflicts, Ordering::Relaxed);
        record_lock_conflicts(conflicts.saturating_sub(reported));
        record_drain_pass(getters as u64);
        tracing::trace!(shards, getters, "Drain pass complete");

        c.active_drains.fetch_sub(1, Ordering::SeqCst);
    }

    /// Invoke one swapped-out batch and stage its output.
    async fn deal(&self, writer: &mut W, batch: &mut Vec<BufferGetter>) {
        let total = batch.len();
        if writer.is_closed() {
            batch.clear();
            self.dropped(total);
            return;
        }

        let mut invoked = 0usize;
        let mut result = Ok(());
        for getter in batch.drain(..) {
            invoked += 1;
            if let Some(buf) = getter() {
                if let Err(e) = writer.append(buf) {
                    result = Err(e);
                    break;
                }
            }
        }
        self.counters
            .getters_invoked
            .fetch_add(invoked as u64, Ordering::Relaxed);

        if let Err(e) = result {
            self.dropped(total - invoked);
            self.fail(writer, "append", e).await;
        }
    }

    async fn flush(&self, writer: &mut W) {
        if writer.is_closed() {
            return;
        }
        match writer.flush().await {
            Ok(()) => {
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.fail(writer, "flush", e).await,
        }
    }

    async fn fail(&self, writer: &mut W, op: &'static str, error: ConnError) {
        tracing::warn!(op, error = %error, "Write failed, closing connection");
        writer.close().await;
        self.closed.store(true, Ordering::SeqCst);
    }

    fn dropped(&self, n: usize) {
        if n == 0 {
            return;
        }
        self.counters
            .getters_dropped
            .fetch_add(n as u64, Ordering::Relaxed);
        record_getters_dropped(n as u64);
    }
}
