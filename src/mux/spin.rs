//! Per-shard spin locks.
//!
//! Each cell is a compare-and-swap flag guarding one value. Acquisition
//! busy-waits and yields the OS thread between attempts, so it is only
//! suitable for critical sections that do O(1) work (pointer swaps and
//! vector appends).

use std::sync::atomic::{AtomicU64, Ordering};

use spin::{Mutex, MutexGuard};

/// A fixed array of independently locked cells.
#[derive(Debug)]
pub struct SpinLockArray<T> {
    cells: Box<[Mutex<T>]>,
    conflicts: AtomicU64,
}

impl<T> SpinLockArray<T> {
    /// Create `size` cells, each initialized by `init(index)`.
    pub fn new(size: usize, mut init: impl FnMut(usize) -> T) -> Self {
        let cells = (0..size).map(|i| Mutex::new(init(i))).collect();
        Self {
            cells,
            conflicts: AtomicU64::new(0),
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Lock cell `idx`, spinning with a cooperative yield while it is held.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len()`.
    pub fn lock(&self, idx: usize) -> MutexGuard<'_, T> {
        let cell = &self.cells[idx];
        loop {
            if let Some(guard) = cell.try_lock() {
                return guard;
            }
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            std::thread::yield_now();
        }
    }

    /// Try to lock cell `idx` once without spinning.
    pub fn try_lock(&self, idx: usize) -> Option<MutexGuard<'_, T>> {
        self.cells[idx].try_lock()
    }

    /// Total failed acquisition attempts since creation.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_cells_are_independent() {
        let locks = SpinLockArray::new(2, |i| i);
        let a = locks.lock(0);
        // Holding cell 0 must not block cell 1.
        let b = locks.try_lock(1).expect("cell 1 should be free");
        assert_eq!(*a, 0);
        assert_eq!(*b, 1);
        assert!(locks.try_lock(0).is_none());
    }

    #[test]
    fn test_unlock_on_drop() {
        let locks = SpinLockArray::new(1, |_| 0u32);
        {
            let mut g = locks.lock(0);
            *g += 1;
        }
        assert_eq!(*locks.lock(0), 1);
        assert_eq!(locks.conflicts(), 0);
    }

    #[test]
    fn test_contended_increments_are_exclusive() {
        let locks = Arc::new(SpinLockArray::new(1, |_| 0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        *locks.lock(0) += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*locks.lock(0), 40_000);
    }
}
