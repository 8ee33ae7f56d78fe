//! Shard store: one getter buffer per shard.

use bytes::Bytes;

use super::spin::SpinLockArray;

/// Deferred write producer.
///
/// Invoked once by the drain task. `None` means there is nothing to write.
pub type BufferGetter = Box<dyn FnOnce() -> Option<Bytes> + Send + 'static>;

/// `size` append-only getter buffers guarded by per-shard spin locks.
pub struct ShardStore {
    shards: SpinLockArray<Vec<BufferGetter>>,
}

impl ShardStore {
    /// Create a store with `size` shards, each preallocated for `capacity`
    /// getters.
    pub fn new(size: usize, capacity: usize) -> Self {
        Self {
            shards: SpinLockArray::new(size, |_| Vec::with_capacity(capacity)),
        }
    }

    pub fn size(&self) -> usize {
        self.shards.len()
    }

    /// Append getters to `shard`.
    ///
    /// Returns `true` when the shard was empty before the append, making the
    /// caller responsible for scheduling a drain.
    ///
    /// The iterator is drained before the lock is taken, so caller code never
    /// runs inside the critical section.
    pub fn append<I>(&self, shard: usize, getters: I) -> bool
    where
        I: IntoIterator<Item = BufferGetter>,
    {
        let mut batch: Vec<BufferGetter> = getters.into_iter().collect();
        let mut buf = self.shards.lock(shard);
        let was_empty = buf.is_empty();
        buf.append(&mut batch);
        was_empty
    }

    /// Exchange the contents of `shard` with `swap`.
    ///
    /// `swap` must be empty on entry; on return it holds the drained getters
    /// and the shard holds the (empty) former swap allocation.
    pub fn swap(&self, shard: usize, swap: &mut Vec<BufferGetter>) {
        debug_assert!(swap.is_empty());
        let mut buf = self.shards.lock(shard);
        std::mem::swap(&mut *buf, swap);
    }

    /// Number of getters currently buffered in `shard`.
    pub fn pending(&self, shard: usize) -> usize {
        self.shards.lock(shard).len()
    }

    pub fn lock_conflicts(&self) -> u64 {
        self.shards.conflicts()
    }
}
