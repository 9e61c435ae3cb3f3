//! Reference-counted object pool.
//!
//! Recycles decoded message objects on the hot decode/dispatch path so a
//! busy feed does not pay one heap allocation per frame.
//!
//! # Lifecycle
//!
//! ```text
//!   acquire()            retain()             release() ... release()
//!  ┌─────────┐  refs=1  ┌─────────┐  refs=n  ┌─────────┐   refs=0
//!  │  free   │ ───────► │ checked │ ───────► │ shared  │ ─────────► reset → free
//!  │  list   │  (miss:  │   out   │          │ fan-out │   exactly once
//!  └─────────┘ allocate)└─────────┘          └─────────┘
//! ```
//!
//! Every consumer that obtains a handle must release it. Releasing past
//! zero, or releasing a handle from an earlier checkout of the same slot,
//! returns [`PoolMisuse`].
//!
//! # Example
//!
//! ```
//! use depth_stream::pool::Pool;
//!
//! let pool = Pool::new(Vec::<u8>::new, Vec::clear);
//!
//! let buf = pool.acquire();
//! buf.write().extend_from_slice(b"frame");
//!
//! let shared = buf.retain().unwrap();
//! buf.release().unwrap();
//! assert_eq!(shared.read().as_slice(), b"frame");
//! shared.release().unwrap();
//!
//! assert_eq!(pool.stats().idle, 1);
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Pool and its free list.
pub mod core;

/// Reference-counted handle and misuse errors.
pub mod pooled;

/// Diagnostic counters.
pub mod stats;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::Pool;
pub use pooled::{PoolMisuse, Pooled};
pub use stats::PoolStats;
