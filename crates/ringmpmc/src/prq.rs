//! PRQ ring segment: the CRQ protocol rebuilt on single-word atomics.
//!
//! Where CRQ matches `(value, idx)` in one double-word CAS, PRQ splits the
//! enqueue into three single-word CASes bridged by a per-thread *bottom*
//! sentinel: claim the value word with `bottom(tid)`, advance the index word
//! a full cycle, then replace the bottom with the real item. If the index
//! CAS loses, the bottom is rolled back to null. A dequeuer that observes a
//! bottom treats the cell as in-progress — it either waits out its bounded
//! retry budget or clears the bottom and poisons the cell, never consuming
//! the sentinel as a payload.
//!
//! Bottom sentinels are encoded as `(tid << 1) | 1`, so payload pointers
//! must have their low bit clear (any 2-aligned allocation qualifies). This
//! is a documented precondition of the queue, checked in debug builds.

use crate::cell::IndexedCell;
use crate::invariants::{debug_assert_ticket_headroom, debug_assert_untagged_payload};
use crate::segment::{
    is_closed, ticket_index, RingGeometry, Segment, SegmentHeader, DEQUEUE_RETRY_BUDGET,
    TRY_CLOSE_LIMIT,
};
use crate::{padded_suffix, Queue, QueueError};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering;

const UNSAFE_BIT: u64 = 1 << 63;

#[inline]
fn node_index(i: u64) -> u64 {
    i & !UNSAFE_BIT
}

#[inline]
fn node_unsafe(i: u64) -> u64 {
    i & UNSAFE_BIT
}

#[inline]
fn set_unsafe(i: u64) -> u64 {
    i | UNSAFE_BIT
}

#[inline]
fn is_bottom<T>(val: *mut T) -> bool {
    (val as usize) & 1 != 0
}

#[inline]
fn bottom_for<T>(tid: usize) -> *mut T {
    ((tid << 1) | 1) as *mut T
}

pub struct PrqSegment<T, const BOUNDED: bool> {
    header: SegmentHeader<Self>,
    geometry: RingGeometry,
    cells: Box<[IndexedCell<T>]>,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, const BOUNDED: bool> Send for PrqSegment<T, BOUNDED> {}
unsafe impl<T: Send, const BOUNDED: bool> Sync for PrqSegment<T, BOUNDED> {}

impl<T, const BOUNDED: bool> PrqSegment<T, BOUNDED> {
    pub(crate) fn with_start(capacity: usize, start: u64) -> Self {
        let geometry = RingGeometry::new(capacity);
        let cells: Box<[IndexedCell<T>]> =
            (0..geometry.capacity()).map(|_| IndexedCell::new()).collect();
        for i in start..start + geometry.capacity() as u64 {
            let slot = geometry.slot(i);
            cells[slot].val.store(ptr::null_mut(), Ordering::Relaxed);
            cells[slot].idx.store(i, Ordering::Relaxed);
        }
        Self {
            header: SegmentHeader::new(start),
            geometry,
            cells,
            _marker: PhantomData,
        }
    }

    pub(crate) fn enqueue_inner(&self, item: NonNull<T>, tid: usize) -> bool {
        debug_assert_untagged_payload!(item.as_ptr());
        let mut try_close = 0u32;

        loop {
            let tail_ticket = self.header.tail.fetch_add(1, Ordering::SeqCst);
            debug_assert_ticket_headroom!(ticket_index(tail_ticket));
            if !BOUNDED && is_closed(tail_ticket) {
                return false;
            }

            let cell = &self.cells[self.geometry.slot(tail_ticket)];
            let idx = cell.idx.load(Ordering::SeqCst);
            let val = cell.val.load(Ordering::SeqCst);

            if val.is_null()
                && node_index(idx) <= tail_ticket
                && (node_unsafe(idx) == 0
                    || self.header.head.load(Ordering::SeqCst) <= tail_ticket)
            {
                let bottom = bottom_for::<T>(tid);
                if cell
                    .val
                    .compare_exchange(val, bottom, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    if cell
                        .idx
                        .compare_exchange(
                            idx,
                            tail_ticket + self.geometry.capacity() as u64,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        )
                        .is_ok()
                    {
                        if cell
                            .val
                            .compare_exchange(
                                bottom,
                                item.as_ptr(),
                                Ordering::SeqCst,
                                Ordering::SeqCst,
                            )
                            .is_ok()
                        {
                            return true;
                        }
                    } else {
                        // Lost the index race: withdraw the claim.
                        let _ = cell.val.compare_exchange(
                            bottom,
                            ptr::null_mut(),
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        );
                    }
                }
            }

            if tail_ticket
                >= self.header.head.load(Ordering::SeqCst) + self.geometry.capacity() as u64
            {
                if BOUNDED {
                    return false;
                }
                try_close += 1;
                if self.header.close_segment(tail_ticket, try_close > TRY_CLOSE_LIMIT) {
                    return false;
                }
            }
        }
    }

    pub(crate) fn dequeue_inner(&self, _tid: usize) -> Option<NonNull<T>> {
        #[cfg(feature = "cautious-dequeue")]
        if self.header.is_empty() {
            return None;
        }

        loop {
            let head_ticket = self.header.head.fetch_add(1, Ordering::SeqCst);
            let cell = &self.cells[self.geometry.slot(head_ticket)];
            let capacity = self.geometry.capacity() as u64;

            let mut r: u32 = 0;
            let mut tt: u64 = 0;

            loop {
                let idx_raw = cell.idx.load(Ordering::SeqCst);
                let unsafe_bit = node_unsafe(idx_raw);
                let idx = node_index(idx_raw);
                let val = cell.val.load(Ordering::SeqCst);

                if !val.is_null() && !is_bottom(val) {
                    if idx == head_ticket + capacity {
                        // The enqueuer already advanced the index a cycle;
                        // a plain store completes the consume.
                        cell.val.store(ptr::null_mut(), Ordering::SeqCst);
                        return NonNull::new(val);
                    }
                    if unsafe_bit != 0 {
                        if cell.idx.load(Ordering::SeqCst) == idx_raw {
                            break;
                        }
                    } else if cell
                        .idx
                        .compare_exchange(idx_raw, set_unsafe(idx), Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        break;
                    }
                } else {
                    if r & 0xff == 0 {
                        tt = self.header.tail.load(Ordering::SeqCst);
                    }
                    let closed = is_closed(tt);
                    let t = ticket_index(tt);
                    if unsafe_bit != 0 || t < head_ticket + 1 || closed || r > DEQUEUE_RETRY_BUDGET
                    {
                        // An in-progress bottom must be cleared before the
                        // slot can be poisoned; if its owner completes first,
                        // re-read and consume normally.
                        if is_bottom(val)
                            && cell
                                .val
                                .compare_exchange(
                                    val,
                                    ptr::null_mut(),
                                    Ordering::SeqCst,
                                    Ordering::SeqCst,
                                )
                                .is_err()
                        {
                            continue;
                        }
                        if cell
                            .idx
                            .compare_exchange(
                                idx_raw,
                                unsafe_bit | (head_ticket + capacity),
                                Ordering::SeqCst,
                                Ordering::SeqCst,
                            )
                            .is_ok()
                        {
                            break;
                        }
                    }
                    r += 1;
                }
            }

            if ticket_index(self.header.tail.load(Ordering::SeqCst)) <= head_ticket + 1 {
                self.header.fix_state();
                return None;
            }
        }
    }
}

impl<T: Send> Segment<T> for PrqSegment<T, false> {
    fn with_start(capacity: usize, start: u64) -> Self {
        Self::with_start(capacity, start)
    }

    fn header(&self) -> &SegmentHeader<Self> {
        &self.header
    }

    fn enqueue(&self, item: NonNull<T>, tid: usize) -> bool {
        self.enqueue_inner(item, tid)
    }

    fn dequeue(&self, tid: usize) -> Option<NonNull<T>> {
        self.dequeue_inner(tid)
    }

    fn segment_name() -> String {
        format!("PRQueue{}", padded_suffix())
    }
}

// =============================================================================
// Bounded flavor
// =============================================================================

/// Bounded MPMC FIFO over a single PRQ ring.
///
/// Payload pointers must be at least 2-aligned; odd pointer representations
/// are reserved for the enqueue protocol's bottom sentinels.
pub struct BoundedPrq<T> {
    inner: PrqSegment<T, true>,
}

impl<T: Send> BoundedPrq<T> {
    pub fn new(capacity: usize, max_threads: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        if max_threads > crate::hazard::MAX_THREADS {
            return Err(QueueError::TooManyThreads {
                max: crate::hazard::MAX_THREADS,
            });
        }
        Ok(Self {
            inner: PrqSegment::with_start(capacity, 0),
        })
    }

    pub fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        self.inner.enqueue_inner(item, tid)
    }

    pub fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        self.inner.dequeue_inner(tid)
    }

    /// Approximate occupancy, clamped to `[0, capacity]`.
    pub fn len(&self, _tid: usize) -> usize {
        self.inner.header.length().min(self.inner.geometry.capacity())
    }

    pub fn is_empty(&self, tid: usize) -> bool {
        self.len(tid) == 0
    }

    pub fn class_name() -> String {
        format!("BoundedPRQueue{}", padded_suffix())
    }
}

impl<T: Send> Queue<T> for BoundedPrq<T> {
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        BoundedPrq::push(self, item, tid)
    }

    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        BoundedPrq::pop(self, tid)
    }

    fn len(&self, tid: usize) -> usize {
        BoundedPrq::len(self, tid)
    }

    fn class_name() -> String {
        BoundedPrq::<T>::class_name()
    }
}
