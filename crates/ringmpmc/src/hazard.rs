//! Hazard-pointer registry for safe segment reclamation.
//!
//! A per-queue matrix of `max_threads x max_hps` published pointers plus a
//! per-thread retired list. A thread publishes the segment it is about to
//! dereference; the retire scanner frees an object only when no slot in the
//! whole matrix still publishes it.
//!
//! ## Synchronization protocol
//!
//! - `protect` publishes with SeqCst and re-reads the source until the
//!   published value is stable, so a concurrent scanner either sees the
//!   publication or the protecting thread sees the newer source value.
//! - `clear` publishes null with Release; the next scan's SeqCst loads
//!   observe it.
//! - Retired lists are owner-thread-only (`UnsafeCell`, no atomics): the
//!   only cross-thread traffic in `retire` is the scan of the hazard matrix.
//!
//! The registry has fixed capacity; queue constructors reject thread counts
//! exceeding [`MAX_THREADS`]. Nothing on the protect/clear fast path
//! allocates.

/// Upper bound on threads a single registry can serve.
pub const MAX_THREADS: usize = 256;

/// Upper bound on hazard slots per thread.
#[cfg_attr(feature = "no-hazard", allow(dead_code))]
pub(crate) const MAX_HP_PER_THREAD: usize = 11;

/// Registry slot protecting the tail segment.
pub(crate) const HP_TAIL: usize = 0;
/// Registry slot protecting the head segment.
pub(crate) const HP_HEAD: usize = 1;

#[cfg(not(feature = "no-hazard"))]
mod imp {
    use super::{MAX_HP_PER_THREAD, MAX_THREADS};
    use crossbeam_utils::CachePadded;
    use std::cell::UnsafeCell;
    use std::ptr;
    use std::sync::atomic::{AtomicPtr, Ordering};

    pub(crate) struct HazardPointers<T> {
        max_hps: usize,
        /// One padded row of slots per thread; padding keeps a thread's
        /// publications off its neighbours' cache lines.
        hazard: Box<[CachePadded<[AtomicPtr<T>; MAX_HP_PER_THREAD]>]>,
        /// Per-thread deferred-delete lists, owner-thread access only.
        retired: Box<[CachePadded<UnsafeCell<Vec<*mut T>>>]>,
    }

    // The retired lists hold exclusively-owned boxes awaiting deletion and
    // are only touched by their owning thread; the hazard matrix is atomic.
    unsafe impl<T: Send> Send for HazardPointers<T> {}
    unsafe impl<T: Send> Sync for HazardPointers<T> {}

    impl<T> HazardPointers<T> {
        /// Callers validate `max_threads` against [`MAX_THREADS`] before
        /// construction; these asserts catch internal misuse only.
        pub(crate) fn new(max_hps: usize, max_threads: usize) -> Self {
            assert!(max_hps <= MAX_HP_PER_THREAD);
            assert!(max_threads <= MAX_THREADS);
            let hazard = (0..max_threads)
                .map(|_| CachePadded::new(std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut()))))
                .collect();
            let retired = (0..max_threads)
                .map(|_| CachePadded::new(UnsafeCell::new(Vec::new())))
                .collect();
            Self {
                max_hps,
                hazard,
                retired,
            }
        }

        /// Publish the current value of `src` into `hazard[tid][slot]`,
        /// re-reading until the published value is stable, and return it.
        pub(crate) fn protect(&self, slot: usize, src: &AtomicPtr<T>, tid: usize) -> *mut T {
            let row = &self.hazard[tid];
            let mut published: *mut T = ptr::null_mut();
            loop {
                let current = src.load(Ordering::SeqCst);
                if current == published {
                    return current;
                }
                row[slot].store(current, Ordering::SeqCst);
                published = current;
            }
        }

        /// Publish a pointer the caller already holds protected elsewhere
        /// (e.g. a successor it just CAS-linked). No re-read.
        pub(crate) fn protect_ptr(&self, slot: usize, ptr: *mut T, tid: usize) -> *mut T {
            self.hazard[tid][slot].store(ptr, Ordering::SeqCst);
            ptr
        }

        /// Clear every slot owned by `tid`.
        pub(crate) fn clear(&self, tid: usize) {
            let row = &self.hazard[tid];
            for slot in row.iter().take(self.max_hps) {
                slot.store(ptr::null_mut(), Ordering::Release);
            }
        }

        /// Clear a single slot.
        pub(crate) fn clear_slot(&self, slot: usize, tid: usize) {
            self.hazard[tid][slot].store(ptr::null_mut(), Ordering::Release);
        }

        /// Hand `ptr` to the deferred-delete list and attempt a scan.
        ///
        /// Each retired object is freed iff no thread currently publishes
        /// it; survivors stay on the list for the next retire call.
        ///
        /// # Safety
        ///
        /// `ptr` must come from `Box::into_raw`, must be unlinked (no new
        /// readers can reach it), and must not be retired twice.
        pub(crate) unsafe fn retire(&self, ptr: *mut T, tid: usize) {
            // Owner-thread-only access per the struct contract.
            let retired = unsafe { &mut *self.retired[tid].get() };
            retired.push(ptr);

            let mut i = 0;
            while i < retired.len() {
                let obj = retired[i];
                let mut in_use = false;
                'scan: for row in self.hazard.iter() {
                    for slot in row.iter().take(self.max_hps) {
                        if slot.load(Ordering::SeqCst) == obj {
                            in_use = true;
                            break 'scan;
                        }
                    }
                }
                if in_use {
                    i += 1;
                } else {
                    retired.swap_remove(i);
                    drop(unsafe { Box::from_raw(obj) });
                }
            }
        }
    }

    impl<T> Drop for HazardPointers<T> {
        fn drop(&mut self) {
            // No concurrent readers can exist when the registry is dropped;
            // everything still deferred is freed now.
            for list in self.retired.iter() {
                let retired = unsafe { &mut *list.get() };
                for &obj in retired.iter() {
                    drop(unsafe { Box::from_raw(obj) });
                }
                retired.clear();
            }
        }
    }
}

#[cfg(feature = "no-hazard")]
mod imp {
    use std::marker::PhantomData;
    use std::sync::atomic::{AtomicPtr, Ordering};

    /// Degenerate registry: protection is a plain load, retire leaks.
    ///
    /// Only sound when reclamation is externally guaranteed (segments are
    /// never freed while any thread may still hold a reference).
    pub(crate) struct HazardPointers<T> {
        _marker: PhantomData<T>,
    }

    unsafe impl<T: Send> Send for HazardPointers<T> {}
    unsafe impl<T: Send> Sync for HazardPointers<T> {}

    impl<T> HazardPointers<T> {
        pub(crate) fn new(_max_hps: usize, _max_threads: usize) -> Self {
            Self {
                _marker: PhantomData,
            }
        }

        pub(crate) fn protect(&self, _slot: usize, src: &AtomicPtr<T>, _tid: usize) -> *mut T {
            src.load(Ordering::SeqCst)
        }

        pub(crate) fn protect_ptr(&self, _slot: usize, ptr: *mut T, _tid: usize) -> *mut T {
            ptr
        }

        pub(crate) fn clear(&self, _tid: usize) {}

        pub(crate) fn clear_slot(&self, _slot: usize, _tid: usize) {}

        pub(crate) unsafe fn retire(&self, _ptr: *mut T, _tid: usize) {}
    }
}

pub(crate) use imp::HazardPointers;
