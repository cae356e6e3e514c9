//! CRQ ring segment: a bounded MPMC ring driven by fetch-add tickets and a
//! double-word CAS on `(value, idx)` pairs.
//!
//! ## Protocol sketch
//!
//! Every slot carries a logical index `idx` congruent to its position modulo
//! the capacity; a full head/tail cycle advances it by one capacity. An
//! enqueuer takes a tail ticket and tries to install `(item, ticket)` over
//! `(null, idx <= ticket)` in one CAS, so a slot can never be claimed by a
//! stale enqueuer after a dequeuer has moved past it. A dequeuer takes a head
//! ticket and either consumes a matching value, or poisons the slot with the
//! unsafe bit (MSB of `idx`) so the lagging enqueuer's CAS must fail.
//!
//! When the ring is observed full, the enqueuer closes the segment: first
//! with a soft CAS that only succeeds if no later ticket was taken, then —
//! after [`TRY_CLOSE_LIMIT`] failed rounds — with an unconditional bit-set.
//! The bounded flavor never closes; it reports `false` to the caller instead.

use crate::cell::CrqCell;
use crate::invariants::debug_assert_ticket_headroom;
use crate::segment::{
    is_closed, ticket_index, RingGeometry, Segment, SegmentHeader, DEQUEUE_RETRY_BUDGET,
    TRY_CLOSE_LIMIT,
};
use crate::{padded_suffix, Queue, QueueError};
use std::marker::PhantomData;
use std::ptr::NonNull;
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

/// The ring itself; `BOUNDED` selects whether an overflowing enqueue closes
/// the segment (linked-chain member) or merely reports a full queue.
pub struct CrqSegment<T, const BOUNDED: bool> {
    header: SegmentHeader<Self>,
    geometry: RingGeometry,
    cells: Box<[CrqCell]>,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, const BOUNDED: bool> Send for CrqSegment<T, BOUNDED> {}
unsafe impl<T: Send, const BOUNDED: bool> Sync for CrqSegment<T, BOUNDED> {}

impl<T, const BOUNDED: bool> CrqSegment<T, BOUNDED> {
    pub(crate) fn with_start(capacity: usize, start: u64) -> Self {
        let geometry = RingGeometry::new(capacity);
        let cells: Box<[CrqCell]> = (0..geometry.capacity()).map(|_| CrqCell::new()).collect();
        for i in start..start + geometry.capacity() as u64 {
            cells[geometry.slot(i)].init(0, i);
        }
        Self {
            header: SegmentHeader::new(start),
            geometry,
            cells,
            _marker: PhantomData,
        }
    }

    pub(crate) fn enqueue_inner(&self, item: NonNull<T>, _tid: usize) -> bool {
        let item_bits = item.as_ptr() as u64;
        let mut try_close = 0u32;

        loop {
            self.header.safe_cluster();
            let tail_ticket = self.header.tail.fetch_add(1, Ordering::SeqCst);
            debug_assert_ticket_headroom!(ticket_index(tail_ticket));
            if !BOUNDED && is_closed(tail_ticket) {
                return false;
            }

            let cell = &self.cells[self.geometry.slot(tail_ticket)];
            let (val, idx_raw) = cell.load();
            if val == 0
                && node_index(idx_raw) <= tail_ticket
                && (node_unsafe(idx_raw) == 0
                    || self.header.head.load(Ordering::SeqCst) < tail_ticket)
            {
                if cell.cas((0, idx_raw), (item_bits, tail_ticket)) {
                    return true;
                }
            }

            if tail_ticket >= self.header.head.load(Ordering::SeqCst) + self.geometry.capacity() as u64
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
            self.header.safe_cluster();
            let head_ticket = self.header.head.fetch_add(1, Ordering::SeqCst);
            let cell = &self.cells[self.geometry.slot(head_ticket)];
            let capacity = self.geometry.capacity() as u64;

            let mut r: u32 = 0;
            let mut tt: u64 = 0;

            loop {
                let (val, idx_raw) = cell.load();
                let unsafe_bit = node_unsafe(idx_raw);
                let idx = node_index(idx_raw);

                // A later cycle already owns this slot; our ticket is spent.
                if idx > head_ticket {
                    break;
                }

                if val != 0 {
                    if idx == head_ticket {
                        // Consume: clear the value, advance the slot a cycle.
                        if cell.cas((val, idx_raw), (0, unsafe_bit | (head_ticket + capacity))) {
                            return NonNull::new(val as *mut T);
                        }
                    } else {
                        // Stale enqueue from an earlier cycle: poison the slot
                        // so its owner cannot be consumed at the wrong ticket.
                        if cell.cas((val, idx_raw), (val, set_unsafe(idx))) {
                            break;
                        }
                    }
                } else {
                    // Empty slot: wait a bounded while for the matching
                    // enqueuer, re-reading tail occasionally to notice
                    // emptiness or closure early.
                    if r & 0xff == 0 {
                        tt = self.header.tail.load(Ordering::SeqCst);
                    }
                    let closed = is_closed(tt);
                    let t = ticket_index(tt);
                    if unsafe_bit != 0 || t < head_ticket + 1 || closed || r > DEQUEUE_RETRY_BUDGET
                    {
                        if cell.cas((val, idx_raw), (val, unsafe_bit | (head_ticket + capacity))) {
                            break;
                        }
                    }
                    r += 1;
                }
            }

            if ticket_index(self.header.tail.load(Ordering::SeqCst)) <= head_ticket {
                self.header.fix_state();
                return None;
            }
        }
    }
}

impl<T: Send> Segment<T> for CrqSegment<T, false> {
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
        format!("CRQueue{}", padded_suffix())
    }
}

// =============================================================================
// Bounded flavor
// =============================================================================

/// Bounded MPMC FIFO over a single CRQ ring.
///
/// `push` returns `false` when the ring holds `capacity` items; the closed
/// bit is never set. Payloads are opaque non-null pointers the queue never
/// dereferences.
pub struct BoundedCrq<T> {
    inner: CrqSegment<T, true>,
}

impl<T> std::fmt::Debug for BoundedCrq<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCrq").finish_non_exhaustive()
    }
}

impl<T: Send> BoundedCrq<T> {
    /// Create a ring of at least `capacity` slots (rounded to a power of two
    /// unless the `modulo-index` feature is active).
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
            inner: CrqSegment::with_start(capacity, 0),
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
        format!("BoundedCRQueue{}", padded_suffix())
    }
}

impl<T: Send> Queue<T> for BoundedCrq<T> {
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        BoundedCrq::push(self, item, tid)
    }

    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        BoundedCrq::pop(self, tid)
    }

    fn len(&self, tid: usize) -> usize {
        BoundedCrq::len(self, tid)
    }

    fn class_name() -> String {
        BoundedCrq::<T>::class_name()
    }
}
