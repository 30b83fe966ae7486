//! Lock-free bounded free list for one pooled object type.
//!
//! Instances move in and out of a crossbeam `ArrayQueue` by value, so
//! concurrent acquire/release never shares a pointer that could be freed
//! under another thread.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;

/// Objects that can be reset before they are retained for reuse.
pub trait Recycle {
    /// Reset the instance to the state a fresh allocation would have.
    fn recycle(&mut self);
}

/// Bounded pool of reusable `T` instances.
///
/// A `FreeList<T>` only ever stores `T`, so one list backs exactly one
/// object kind.
pub struct FreeList<T> {
    /// Retained instances; `None` when the capacity is zero.
    slots: Option<ArrayQueue<T>>,
    /// Statistics: instances acquired from the list.
    hits: AtomicUsize,
    /// Statistics: instances allocated fresh (list empty).
    misses: AtomicUsize,
    /// Statistics: instances returned to the list.
    returns: AtomicUsize,
    /// Statistics: instances dropped (list full).
    drops: AtomicUsize,
}

impl<T: Recycle> FreeList<T> {
    /// Create a free list retaining at most `capacity` instances.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (capacity > 0).then(|| ArrayQueue::new(capacity)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            returns: AtomicUsize::new(0),
            drops: AtomicUsize::new(0),
        }
    }

    /// Take a retained instance, or build one with `alloc` if none is left.
    ///
    /// A failing `alloc` is reported as-is and not retried.
    #[inline]
    pub fn acquire_with<F>(&self, alloc: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(item) = self.slots.as_ref().and_then(ArrayQueue::pop) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(item);
        }

        let item = alloc()?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(item)
    }

    /// Reset `item` and keep it for reuse if there is room, otherwise drop it.
    ///
    /// Returns `true` when the instance was retained.
    #[inline]
    pub fn release(&self, mut item: T) -> bool {
        let Some(slots) = self.slots.as_ref() else {
            self.drops.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        item.recycle();

        match slots.push(item) {
            Ok(()) => {
                self.returns.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_rejected) => {
                self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Maximum number of retained instances.
    pub fn capacity(&self) -> usize {
        self.slots.as_ref().map_or(0, ArrayQueue::capacity)
    }

    /// Current number of retained instances.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.as_ref().map_or(0, ArrayQueue::len)
    }

    /// Check if no instance is retained.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instances handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.stats().outstanding()
    }

    /// Get free list statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }
}

/// Free list statistics for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Current instances in the list.
    pub size: usize,
    /// Instances reused from the list.
    pub hits: usize,
    /// Instances allocated fresh.
    pub misses: usize,
    /// Instances returned to the list.
    pub returns: usize,
    /// Instances dropped because the list was full.
    pub drops: usize,
}

impl PoolStats {
    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Acquires minus releases.
    pub fn outstanding(&self) -> usize {
        (self.hits + self.misses).saturating_sub(self.returns + self.drops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Default)]
    struct Slab {
        data: Vec<u8>,
        generation: u32,
    }

    impl Recycle for Slab {
        fn recycle(&mut self) {
            self.data.clear();
            self.generation += 1;
        }
    }

    fn fresh() -> Result<Slab> {
        Ok(Slab {
            data: Vec::with_capacity(64),
            generation: 0,
        })
    }

    #[test]
    fn test_acquire_release_reuses() {
        let list = FreeList::new(4);

        let mut slab = list.acquire_with(fresh).unwrap();
        slab.data.extend_from_slice(b"hello");
        assert_eq!(list.stats().misses, 1);

        assert!(list.release(slab));
        assert_eq!(list.len(), 1);

        let slab = list.acquire_with(fresh).unwrap();
        assert!(slab.data.is_empty());
        assert!(slab.data.capacity() >= 64);
        assert_eq!(slab.generation, 1);

        let stats = list.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.returns, 1);
    }

    #[test]
    fn test_release_beyond_capacity_drops() {
        let list = FreeList::new(2);

        let slabs: Vec<_> = (0..5).map(|_| list.acquire_with(fresh).unwrap()).collect();
        assert_eq!(list.outstanding(), 5);

        let retained: Vec<bool> = slabs.into_iter().map(|s| list.release(s)).collect();
        assert_eq!(retained, vec![true, true, false, false, false]);

        let stats = list.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.returns, 2);
        assert_eq!(stats.drops, 3);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(list.capacity(), 2);
    }

    #[test]
    fn test_zero_capacity_never_retains() {
        let list = FreeList::new(0);

        let slab = list.acquire_with(fresh).unwrap();
        assert!(!list.release(slab));
        assert!(list.is_empty());
        assert_eq!(list.capacity(), 0);
        assert_eq!(list.stats().drops, 1);
    }

    #[test]
    fn test_allocation_failure_propagates() {
        let list: FreeList<Slab> = FreeList::new(4);

        let result = list.acquire_with(|| Err(Error::AllocationFailed { requested: 64 }));
        assert!(matches!(
            result,
            Err(Error::AllocationFailed { requested: 64 })
        ));

        // A failed allocation is not an outstanding instance
        assert_eq!(list.outstanding(), 0);
        assert_eq!(list.stats().misses, 0);
    }

    #[test]
    fn test_failed_allocation_not_needed_when_retained() {
        let list = FreeList::new(4);
        list.release(Slab::default());

        let slab = list.acquire_with(|| Err(Error::AllocationFailed { requested: 64 }));
        assert!(slab.is_ok());
    }

    #[test]
    fn test_outstanding_never_exceeds_acquires() {
        let list = FreeList::new(3);
        let mut held = Vec::new();

        for round in 0..50usize {
            if round % 3 == 2 {
                if let Some(slab) = held.pop() {
                    list.release(slab);
                }
            } else {
                held.push(list.acquire_with(fresh).unwrap());
            }
            assert_eq!(list.outstanding(), held.len());
            assert!(list.len() <= 3);
        }
    }

    #[test]
    fn test_concurrent_stress() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 10_000;
        const CAPACITY: usize = 16;

        let list = Arc::new(FreeList::new(CAPACITY));

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let list = list.clone();
                thread::spawn(move || {
                    let mut held = Vec::new();
                    for i in 0..ROUNDS {
                        let mut slab = list.acquire_with(fresh).unwrap();
                        assert!(slab.data.is_empty());
                        slab.data.push(t as u8);
                        held.push(slab);

                        // Hold a few instances at a time to churn the list
                        if held.len() > (i % 4) {
                            for slab in held.drain(..) {
                                list.release(slab);
                            }
                        }
                    }
                    for slab in held {
                        list.release(slab);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let stats = list.stats();
        assert!(stats.size <= CAPACITY);
        assert_eq!(stats.hits + stats.misses, THREADS * ROUNDS);
        assert_eq!(stats.returns + stats.drops, THREADS * ROUNDS);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = PoolStats {
            size: 0,
            hits: 75,
            misses: 25,
            returns: 70,
            drops: 5,
        };
        assert!((stats.hit_rate() - 0.75).abs() < 0.001);
        assert_eq!(stats.outstanding(), 25);
    }
}
