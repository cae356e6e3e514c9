//! Per-slot cell layouts for the ring segments.
//!
//! Two layouts exist for every cell kind: cache-line padded (the default,
//! one slot per line so neighbouring slots never false-share) and packed
//! (feature `unpadded-cells`, denser but contended). Selection is
//! compile-time; the algorithms are layout-agnostic.

use portable_atomic::AtomicU128;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

// =============================================================================
// CRQ cell: double-word (value, index)
// =============================================================================

/// A `(value, idx)` pair packed into one 128-bit atomic.
///
/// The CRQ protocol needs to match and replace both halves in a single
/// compare-exchange. Packing them into an `AtomicU128` maps that double-word
/// CAS onto `compare_exchange` directly (cmpxchg16b on x86_64, a lock
/// fallback elsewhere). Value lives in the low half, index in the high half;
/// bit 63 of the index half is the unsafe bit.
#[repr(C)]
#[cfg_attr(not(feature = "unpadded-cells"), repr(align(64)))]
#[cfg_attr(feature = "unpadded-cells", repr(align(16)))]
pub(crate) struct CrqCell {
    state: AtomicU128,
}

impl CrqCell {
    #[inline]
    fn pack(val: u64, idx: u64) -> u128 {
        (u128::from(idx) << 64) | u128::from(val)
    }

    #[inline]
    fn unpack(state: u128) -> (u64, u64) {
        (state as u64, (state >> 64) as u64)
    }

    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU128::new(0),
        }
    }

    /// Atomically read `(value, idx)`.
    #[inline]
    pub(crate) fn load(&self) -> (u64, u64) {
        Self::unpack(self.state.load(Ordering::SeqCst))
    }

    /// Unsynchronized initialization store (segment construction only).
    #[inline]
    pub(crate) fn init(&self, val: u64, idx: u64) {
        self.state.store(Self::pack(val, idx), Ordering::Relaxed);
    }

    /// Double-word CAS: replace `(old_val, old_idx)` with `(new_val, new_idx)`.
    #[inline]
    pub(crate) fn cas(&self, old: (u64, u64), new: (u64, u64)) -> bool {
        self.state
            .compare_exchange(
                Self::pack(old.0, old.1),
                Self::pack(new.0, new.1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

// =============================================================================
// Indexed cell: independent single-word (value, index)
// =============================================================================

/// A `(value, idx)` pair of independent single-word atomics.
///
/// Used by the PRQ segment (whose protocol replaces the double-word CAS with
/// a three-step bottom-sentinel dance) and the MTQ segment (whose per-cell
/// index is a pure ticket match). Fields are accessed directly by the
/// protocols; there is no combined load.
#[repr(C)]
#[cfg_attr(not(feature = "unpadded-cells"), repr(align(64)))]
#[cfg_attr(feature = "unpadded-cells", repr(align(16)))]
pub(crate) struct IndexedCell<T> {
    pub(crate) val: AtomicPtr<T>,
    pub(crate) idx: AtomicU64,
}

impl<T> IndexedCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            val: AtomicPtr::new(std::ptr::null_mut()),
            idx: AtomicU64::new(0),
        }
    }
}

// =============================================================================
// Plain cell: value only
// =============================================================================

/// A value-only cell for the FAA array queue; slot state is carried by the
/// node-level enqueue/dequeue indices instead of a per-cell index.
#[repr(C)]
#[cfg_attr(not(feature = "unpadded-cells"), repr(align(64)))]
pub(crate) struct PlainCell<T> {
    pub(crate) val: AtomicPtr<T>,
}

impl<T> PlainCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            val: AtomicPtr::new(std::ptr::null_mut()),
        }
    }
}
