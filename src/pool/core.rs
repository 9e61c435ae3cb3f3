//! Factory-backed pool of reusable instances.
//!
//! The free list is internally synchronised, so any number of tasks or
//! threads may acquire and release concurrently without locking anything
//! themselves.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tracing::trace;

use super::pooled::{Pooled, Slot};
use super::stats::{Counters, PoolStats};

// ============================================================================
// Types
// ============================================================================

/// Creates a fresh instance on a pool miss.
pub type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Clears an instance's payload before it goes back on the free list.
pub type Reset<T> = Box<dyn Fn(&mut T) + Send + Sync>;

// ============================================================================
// Shared
// ============================================================================

/// State shared by a pool and every handle it has handed out.
pub(crate) struct Shared<T> {
    free: Mutex<Vec<Arc<Slot<T>>>>,
    factory: Factory<T>,
    reset: Reset<T>,
    max_idle: Option<usize>,
    pub(crate) counters: Counters,
}

impl<T> Shared<T> {
    /// Resets `slot` and puts it back on the free list.
    ///
    /// Called exactly once per checkout, by the release that drove the
    /// reference count to zero.
    pub(crate) fn recycle(&self, slot: Arc<Slot<T>>) {
        {
            let mut value = slot.value.write();
            (self.reset)(&mut value);
        }
        self.counters.returned.fetch_add(1, Ordering::Relaxed);

        let mut free = self.free.lock();
        if let Some(max) = self.max_idle
            && free.len() >= max
        {
            trace!(slot = slot.id, max_idle = max, "Free list full, dropping instance");
            return;
        }
        free.push(slot);
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Reference-counted pool of `T`.
///
/// Cloning a `Pool` is cheap and yields another handle to the same free
/// list and counters.
///
/// # Example
///
/// ```
/// use depth_stream::pool::Pool;
///
/// let pool = Pool::new(String::new, String::clear);
/// let s = pool.acquire();
/// s.write().push_str("abc");
/// s.release().unwrap();
///
/// // Reused and already cleared.
/// let again = pool.acquire();
/// assert!(again.read().is_empty());
/// assert_eq!(pool.stats().allocated, 1);
/// # again.release().unwrap();
/// ```
pub struct Pool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("stats", &self.stats())
            .field("max_idle", &self.shared.max_idle)
            .finish()
    }
}

// ============================================================================
// Pool - Constructors
// ============================================================================

impl<T> Pool<T> {
    /// Creates a pool with an unbounded free list.
    ///
    /// # Arguments
    ///
    /// * `factory` - Builds a new instance on a pool miss
    /// * `reset` - Clears payload fields when the last reference is released
    pub fn new<F, R>(factory: F, reset: R) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::build(Box::new(factory), Box::new(reset), None)
    }

    /// Creates a pool whose free list keeps at most `max_idle` instances.
    ///
    /// Instances returned while the free list is full are dropped.
    pub fn with_max_idle<F, R>(factory: F, reset: R, max_idle: usize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::build(Box::new(factory), Box::new(reset), Some(max_idle))
    }

    fn build(factory: Factory<T>, reset: Reset<T>, max_idle: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                free: Mutex::new(Vec::new()),
                factory,
                reset,
                max_idle,
                counters: Counters::default(),
            }),
        }
    }
}

// ============================================================================
// Pool - Public API
// ============================================================================

impl<T> Pool<T> {
    /// Checks out an instance with its reference count set to 1.
    ///
    /// Pops the free list, or allocates through the factory on a miss.
    pub fn acquire(&self) -> Pooled<T> {
        let popped = self.shared.free.lock().pop();

        let slot = match popped {
            Some(slot) => slot,
            None => {
                let id = self.shared.counters.allocated.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(slot = id, "Pool miss, allocating");
                Arc::new(Slot::new(id, (self.shared.factory)()))
            }
        };

        self.shared.counters.referenced.fetch_add(1, Ordering::Relaxed);
        Pooled::checkout(slot, Arc::clone(&self.shared))
    }

    /// Returns a snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let idle = self.shared.free.lock().len();
        self.shared.counters.snapshot(idle)
    }

    /// Number of instances currently on the free list.
    #[inline]
    #[must_use]
    pub fn idle(&self) -> usize {
        self.shared.free.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use proptest::prelude::*;

    use crate::pool::PoolMisuse;

    fn string_pool() -> Pool<String> {
        Pool::new(String::new, String::clear)
    }

    #[test]
    fn test_acquire_allocates_on_miss() {
        let pool = string_pool();
        let a = pool.acquire();
        let b = pool.acquire();

        assert_ne!(a.slot_id(), b.slot_id());
        assert_eq!(a.ref_count(), 1);

        let stats = pool.stats();
        assert_eq!(stats.allocated, 2);
        assert_eq!(stats.referenced, 2);
        assert_eq!(stats.returned, 0);

        a.release().unwrap();
        b.release().unwrap();
    }

    #[test]
    fn test_release_resets_and_reuses() {
        let pool = string_pool();
        let first = pool.acquire();
        let slot = first.slot_id();
        first.write().push_str("payload");
        assert!(first.release().unwrap());

        let second = pool.acquire();
        assert_eq!(second.slot_id(), slot);
        assert!(second.read().is_empty());
        assert_eq!(pool.stats().allocated, 1);
        second.release().unwrap();
    }

    #[test]
    fn test_retain_delays_return() {
        let pool = string_pool();
        let handle = pool.acquire();
        let shared = handle.retain().unwrap();
        assert_eq!(handle.ref_count(), 2);

        assert!(!handle.release().unwrap());
        assert_eq!(pool.idle(), 0);

        assert!(shared.release().unwrap());
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.stats().returned, 1);
    }

    #[test]
    fn test_double_release_is_misuse() {
        let pool = string_pool();
        let handle = pool.acquire();
        handle.release().unwrap();

        let err = handle.release().unwrap_err();
        assert!(matches!(err, PoolMisuse::Overreleased { .. }));
        assert_eq!(pool.stats().returned, 1);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_stale_handle_is_misuse() {
        let pool = string_pool();
        let old = pool.acquire();
        old.release().unwrap();

        let current = pool.acquire();
        assert_eq!(current.slot_id(), old.slot_id());

        assert!(matches!(old.release(), Err(PoolMisuse::Stale { .. })));
        assert!(matches!(old.retain(), Err(PoolMisuse::Stale { .. })));
        assert_eq!(current.ref_count(), 1);
        current.release().unwrap();
    }

    #[test]
    fn test_retain_after_release_is_misuse() {
        let pool = string_pool();
        let handle = pool.acquire();
        handle.release().unwrap();
        assert!(matches!(
            handle.retain(),
            Err(PoolMisuse::Overreleased { .. })
        ));
    }

    #[test]
    fn test_max_idle_drops_excess() {
        let pool = Pool::with_max_idle(String::new, String::clear, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        a.release().unwrap();
        b.release().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.returned, 2);
    }

    #[test]
    fn test_clone_shares_free_list() {
        let pool = string_pool();
        let other = pool.clone();
        pool.acquire().release().unwrap();
        assert_eq!(other.idle(), 1);
    }

    #[test]
    fn test_concurrent_fanout_returns_each_checkout_once() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 500;

        let pool = Pool::new(Vec::<u64>::new, Vec::clear);

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for i in 0..ROUNDS {
                        let handle = pool.acquire();
                        handle.write().push(i as u64);

                        let copies: Vec<_> =
                            (0..3).map(|_| handle.retain().unwrap()).collect();
                        let readers: Vec<_> = copies
                            .into_iter()
                            .map(|copy| {
                                thread::spawn(move || {
                                    assert_eq!(copy.read().len(), 1);
                                    copy.release().unwrap();
                                })
                            })
                            .collect();

                        handle.release().unwrap();
                        for reader in readers {
                            reader.join().unwrap();
                        }
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.referenced, (THREADS * ROUNDS) as u64);
        assert_eq!(stats.returned, stats.referenced);
        assert_eq!(stats.outstanding(), 0);
        assert!(stats.allocated <= (THREADS * ROUNDS) as u64);
        assert_eq!(stats.idle as u64, stats.allocated);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Retain,
        Release,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Retain), Just(Op::Release)]
    }

    proptest! {
        #[test]
        fn prop_count_never_negative(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let pool = Pool::new(String::new, String::clear);
            let handle = pool.acquire();
            let mut expected: u32 = 1;
            let mut returns = 0u64;

            for op in ops {
                match op {
                    Op::Retain => {
                        let result = handle.retain();
                        if expected == 0 {
                            prop_assert!(result.is_err());
                        } else {
                            // Dropping the extra handle leaves the count raised.
                            prop_assert!(result.is_ok());
                            expected += 1;
                        }
                    }
                    Op::Release => {
                        let result = handle.release();
                        if expected == 0 {
                            let overreleased =
                                matches!(result, Err(PoolMisuse::Overreleased { .. }));
                            prop_assert!(overreleased);
                        } else {
                            expected -= 1;
                            prop_assert_eq!(result.unwrap(), expected == 0);
                            if expected == 0 {
                                returns += 1;
                            }
                        }
                    }
                }
                prop_assert_eq!(handle.ref_count(), expected);
            }

            prop_assert_eq!(pool.stats().returned, returns);
            prop_assert!(returns <= 1);
        }
    }
}
