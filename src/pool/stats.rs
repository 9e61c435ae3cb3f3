//! Pool diagnostic counters.
//!
//! Counters are informational only; nothing in the pool relies on them
//! for correctness.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Counters
// ============================================================================

/// Live counters shared by a pool and its handles.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    /// Instances ever created by the factory.
    pub allocated: AtomicU64,
    /// Checkouts served by `acquire`.
    pub referenced: AtomicU64,
    /// Zero transitions (instances handed back).
    pub returned: AtomicU64,
}

impl Counters {
    /// Takes a point-in-time snapshot.
    pub fn snapshot(&self, idle: usize) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            referenced: self.referenced.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            idle,
        }
    }
}

// ============================================================================
// PoolStats
// ============================================================================

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total instances ever allocated (pool misses).
    pub allocated: u64,
    /// Total checkouts.
    pub referenced: u64,
    /// Total returns.
    pub returned: u64,
    /// Instances currently sitting on the free list.
    pub idle: usize,
}

impl PoolStats {
    /// Checkouts that have not been returned yet.
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.referenced.saturating_sub(self.returned)
    }

    /// Fraction of checkouts served from the free list.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        if self.referenced == 0 {
            return 0.0;
        }
        let hits = self.referenced.saturating_sub(self.allocated);
        hits as f64 / self.referenced as f64
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocated={} referenced={} returned={} idle={}",
            self.allocated, self.referenced, self.returned, self.idle
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let counters = Counters::default();
        counters.allocated.fetch_add(2, Ordering::Relaxed);
        counters.referenced.fetch_add(5, Ordering::Relaxed);
        counters.returned.fetch_add(4, Ordering::Relaxed);

        let stats = counters.snapshot(2);
        assert_eq!(stats.allocated, 2);
        assert_eq!(stats.referenced, 5);
        assert_eq!(stats.returned, 4);
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.outstanding(), 1);
    }

    #[test]
    fn test_hit_ratio() {
        let empty = PoolStats::default();
        assert_eq!(empty.hit_ratio(), 0.0);

        let stats = PoolStats {
            allocated: 1,
            referenced: 4,
            returned: 4,
            idle: 1,
        };
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display() {
        let stats = PoolStats {
            allocated: 1,
            referenced: 2,
            returned: 3,
            idle: 4,
        };
        assert_eq!(
            stats.to_string(),
            "allocated=1 referenced=2 returned=3 idle=4"
        );
    }
}
