//! Reference-counted handle to a pooled instance.
//!
//! A slot packs its checkout generation and reference count into a single
//! `AtomicU64` (generation in the high 32 bits, count in the low 32 bits).
//! Every retain/release is a compare-and-swap on that word, so a handle
//! from an earlier checkout can never touch the count of a later one and
//! the transition to zero happens exactly once.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use super::core::Shared;

// ============================================================================
// PoolMisuse
// ============================================================================

/// Lifetime violation on a pooled handle.
///
/// Always a caller bug: some consumer released more often than it acquired
/// or retained, or kept using a handle after giving it back.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMisuse {
    /// Release or retain on a slot whose count is already zero.
    #[error("pool misuse: slot {slot} released with reference count already zero")]
    Overreleased {
        /// Slot identifier.
        slot: u64,
    },

    /// Handle belongs to an earlier checkout of the slot.
    #[error("pool misuse: stale handle for slot {slot} (slot was recycled)")]
    Stale {
        /// Slot identifier.
        slot: u64,
    },

    /// Payload accessed after the checkout's last release.
    #[error("pool misuse: slot {slot} accessed after its last release")]
    Released {
        /// Slot identifier.
        slot: u64,
    },

    /// Reference count would exceed `u32::MAX`.
    #[error("pool misuse: reference count overflow on slot {slot}")]
    Overflow {
        /// Slot identifier.
        slot: u64,
    },
}

// ============================================================================
// Slot
// ============================================================================

const COUNT_MASK: u64 = 0xFFFF_FFFF;

#[inline]
const fn pack(generation: u32, count: u32) -> u64 {
    ((generation as u64) << 32) | count as u64
}

#[inline]
const fn unpack(state: u64) -> (u32, u32) {
    ((state >> 32) as u32, (state & COUNT_MASK) as u32)
}

/// One reusable instance plus its packed generation/count word.
pub(crate) struct Slot<T> {
    pub(crate) id: u64,
    state: AtomicU64,
    pub(crate) value: RwLock<T>,
}

impl<T> Slot<T> {
    pub(crate) fn new(id: u64, value: T) -> Self {
        Self {
            id,
            state: AtomicU64::new(pack(0, 0)),
            value: RwLock::new(value),
        }
    }
}

// ============================================================================
// Pooled
// ============================================================================

/// Handle to a checked-out pool instance.
///
/// Obtained from [`Pool::acquire`](super::Pool::acquire) with a reference
/// count of 1. Each [`retain`](Self::retain) yields one more handle and
/// raises the count; each [`release`](Self::release) lowers it. The last
/// release resets the instance and returns it to the pool.
///
/// Dropping a handle without releasing it does not return the instance;
/// the pool simply allocates a replacement on a later miss.
pub struct Pooled<T> {
    slot: Arc<Slot<T>>,
    shared: Arc<Shared<T>>,
    generation: u32,
}

impl<T> Pooled<T> {
    /// Starts a new checkout on a slot taken off the free list (or fresh).
    pub(crate) fn checkout(slot: Arc<Slot<T>>, shared: Arc<Shared<T>>) -> Self {
        let (previous, _) = unpack(slot.state.load(Ordering::Acquire));
        let generation = previous.wrapping_add(1);
        slot.state.store(pack(generation, 1), Ordering::Release);

        Self {
            slot,
            shared,
            generation,
        }
    }

    /// Increments the reference count and returns another handle.
    ///
    /// # Errors
    ///
    /// - [`PoolMisuse::Overreleased`] if the count already reached zero
    /// - [`PoolMisuse::Stale`] if the slot has since been checked out again
    /// - [`PoolMisuse::Overflow`] if the count would overflow
    pub fn retain(&self) -> Result<Self, PoolMisuse> {
        let mut current = self.slot.state.load(Ordering::Acquire);
        loop {
            let (generation, count) = unpack(current);
            self.check_generation(generation)?;
            if count == 0 {
                return Err(PoolMisuse::Overreleased { slot: self.slot.id });
            }
            let next = count
                .checked_add(1)
                .ok_or(PoolMisuse::Overflow { slot: self.slot.id })?;

            match self.slot.state.compare_exchange_weak(
                current,
                pack(generation, next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(Self {
                        slot: Arc::clone(&self.slot),
                        shared: Arc::clone(&self.shared),
                        generation: self.generation,
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Decrements the reference count.
    ///
    /// Returns `true` if this call released the last reference, in which
    /// case the instance has been reset and handed back to the pool.
    ///
    /// # Errors
    ///
    /// - [`PoolMisuse::Overreleased`] if the count is already zero
    /// - [`PoolMisuse::Stale`] if the slot has since been checked out again
    pub fn release(&self) -> Result<bool, PoolMisuse> {
        let mut current = self.slot.state.load(Ordering::Acquire);
        loop {
            let (generation, count) = unpack(current);
            self.check_generation(generation)?;
            if count == 0 {
                return Err(PoolMisuse::Overreleased { slot: self.slot.id });
            }

            match self.slot.state.compare_exchange_weak(
                current,
                pack(generation, count - 1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) if count == 1 => {
                    self.shared.recycle(Arc::clone(&self.slot));
                    return Ok(true);
                }
                Ok(_) => return Ok(false),
                Err(observed) => current = observed,
            }
        }
    }

    /// Locks the instance for shared reads.
    ///
    /// The handle must still be live; use [`try_read`](Self::try_read) when
    /// that is not known.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        debug_assert!(self.is_live(), "read through a dead pooled handle");
        self.slot.value.read()
    }

    /// Locks the instance for writing.
    ///
    /// The handle must still be live; use [`try_write`](Self::try_write)
    /// when that is not known.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        debug_assert!(self.is_live(), "write through a dead pooled handle");
        self.slot.value.write()
    }

    /// Locks the instance for shared reads, checking the handle first.
    ///
    /// The check runs with the lock held, so the instance cannot be reset
    /// while the guard is alive.
    ///
    /// # Errors
    ///
    /// - [`PoolMisuse::Released`] if this checkout's last reference is gone
    /// - [`PoolMisuse::Stale`] if the slot has since been checked out again
    pub fn try_read(&self) -> Result<RwLockReadGuard<'_, T>, PoolMisuse> {
        let guard = self.slot.value.read();
        self.check_live()?;
        Ok(guard)
    }

    /// Locks the instance for writing, checking the handle first.
    ///
    /// # Errors
    ///
    /// Same as [`try_read`](Self::try_read).
    pub fn try_write(&self) -> Result<RwLockWriteGuard<'_, T>, PoolMisuse> {
        let guard = self.slot.value.write();
        self.check_live()?;
        Ok(guard)
    }

    /// Current reference count of the slot.
    #[inline]
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        unpack(self.slot.state.load(Ordering::Acquire)).1
    }

    /// Identifier of the underlying slot (stable across reuse).
    #[inline]
    #[must_use]
    pub fn slot_id(&self) -> u64 {
        self.slot.id
    }

    /// Returns `true` while this handle's checkout still holds references.
    #[must_use]
    pub fn is_live(&self) -> bool {
        let (generation, count) = unpack(self.slot.state.load(Ordering::Acquire));
        generation == self.generation && count > 0
    }

    fn check_live(&self) -> Result<(), PoolMisuse> {
        let (generation, count) = unpack(self.slot.state.load(Ordering::Acquire));
        self.check_generation(generation)?;
        if count == 0 {
            return Err(PoolMisuse::Released { slot: self.slot.id });
        }
        Ok(())
    }

    #[inline]
    fn check_generation(&self, generation: u32) -> Result<(), PoolMisuse> {
        if generation == self.generation {
            Ok(())
        } else {
            Err(PoolMisuse::Stale { slot: self.slot.id })
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("slot", &self.slot.id)
            .field("generation", &self.generation)
            .field("refs", &self.ref_count())
            .field("value", &*self.slot.value.read())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
