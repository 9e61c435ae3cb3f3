//! Tri-state cancellation signal shared by a connection's background tasks.
//!
//! ```text
//!  NotRequested ──request()──► Requested ──acknowledge()──► Acknowledged
//! ```
//!
//! Requesting is idempotent: only the first call flips the state and wakes
//! waiters; later calls return `false` and do nothing.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

// ============================================================================
// ShutdownState
// ============================================================================

/// Progress of a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    /// Nobody asked for shutdown yet.
    NotRequested = 0,
    /// Shutdown requested; tasks are winding down.
    Requested = 1,
    /// Every background task has exited.
    Acknowledged = 2,
}

impl ShutdownState {
    #[inline]
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotRequested,
            1 => Self::Requested,
            _ => Self::Acknowledged,
        }
    }
}

// ============================================================================
// ShutdownSignal
// ============================================================================

struct Inner {
    state: AtomicU8,
    requested: CancellationToken,
    acknowledged: CancellationToken,
}

/// Cloneable one-shot shutdown signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ShutdownSignal").field(&self.state()).finish()
    }
}

impl ShutdownSignal {
    /// Creates a signal in [`ShutdownState::NotRequested`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(ShutdownState::NotRequested as u8),
                requested: CancellationToken::new(),
                acknowledged: CancellationToken::new(),
            }),
        }
    }

    /// Requests shutdown.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn request(&self) -> bool {
        let first = self
            .inner
            .state
            .compare_exchange(
                ShutdownState::NotRequested as u8,
                ShutdownState::Requested as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if first {
            self.inner.requested.cancel();
        }
        first
    }

    /// Marks shutdown as complete.
    ///
    /// Implies a request. Returns `true` only for the call that performed the
    /// transition to [`ShutdownState::Acknowledged`].
    pub fn acknowledge(&self) -> bool {
        self.request();
        let first = self
            .inner
            .state
            .compare_exchange(
                ShutdownState::Requested as u8,
                ShutdownState::Acknowledged as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if first {
            self.inner.acknowledged.cancel();
        }
        first
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Returns `true` once shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.state() != ShutdownState::NotRequested
    }

    /// Resolves once shutdown has been requested.
    #[inline]
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.requested.cancelled()
    }

    /// Resolves once shutdown has been acknowledged.
    #[inline]
    pub fn acknowledged(&self) -> WaitForCancellationFuture<'_> {
        self.inner.acknowledged.cancelled()
    }
}

// ============================================================================
// Tests
// ============================================================================
