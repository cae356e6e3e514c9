//! MTQ ring segment: ticket matching with bounded backoff.
//!
//! The simplest of the three rings. A cell is writable exactly when its
//! index equals the enqueue ticket and readable exactly when it equals
//! ticket+1; winners advance the shared counter with a CAS and losers back
//! off with a bounded exponential busy-wait. When a cell's index has moved
//! *past* a thread's ticket the ring is full (enqueue side, which then
//! closes the segment) or empty (dequeue side).

use crate::backoff::Backoff;
use crate::cell::IndexedCell;
use crate::invariants::debug_assert_ticket_headroom;
use crate::segment::{
    is_closed, ticket_index, RingGeometry, Segment, SegmentHeader, TRY_CLOSE_LIMIT,
};
use crate::{padded_suffix, Queue, QueueError};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

pub struct MtqSegment<T, const BOUNDED: bool> {
    header: SegmentHeader<Self>,
    geometry: RingGeometry,
    cells: Box<[IndexedCell<T>]>,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, const BOUNDED: bool> Send for MtqSegment<T, BOUNDED> {}
unsafe impl<T: Send, const BOUNDED: bool> Sync for MtqSegment<T, BOUNDED> {}

impl<T, const BOUNDED: bool> MtqSegment<T, BOUNDED> {
    pub(crate) fn with_start(capacity: usize, start: u64) -> Self {
        // A single slot cannot distinguish "written at ticket t" from
        // "writable at ticket t+1": both read idx == t+1. Two slots minimum.
        let geometry = RingGeometry::new(capacity.max(2));
        let cells: Box<[IndexedCell<T>]> =
            (0..geometry.capacity()).map(|_| IndexedCell::new()).collect();
        for i in start..start + geometry.capacity() as u64 {
            cells[geometry.slot(i)].idx.store(i, Ordering::Relaxed);
        }
        Self {
            header: SegmentHeader::new(start),
            geometry,
            cells,
            _marker: PhantomData,
        }
    }

    pub(crate) fn enqueue_inner(&self, item: NonNull<T>, _tid: usize) -> bool {
        let mut backoff = Backoff::new();
        let mut try_close = 0u32;

        loop {
            let tail_ticket = self.header.tail.load(Ordering::Relaxed);
            debug_assert_ticket_headroom!(ticket_index(tail_ticket));
            if !BOUNDED && is_closed(tail_ticket) {
                return false;
            }

            let cell = &self.cells[self.geometry.slot(tail_ticket)];
            let idx = cell.idx.load(Ordering::Acquire);

            if tail_ticket == idx {
                if self
                    .header
                    .tail
                    .compare_exchange_weak(
                        tail_ticket,
                        tail_ticket + 1,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // Ticket won: the Release on idx publishes the value.
                    cell.val.store(item.as_ptr(), Ordering::Relaxed);
                    cell.idx.store(idx + 1, Ordering::Release);
                    return true;
                }
                backoff.pause();
            } else if tail_ticket > idx {
                // The cell still belongs to the previous cycle: ring is full.
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
        let mut backoff = Backoff::new();

        loop {
            let head_ticket = self.header.head.load(Ordering::Relaxed);
            let cell = &self.cells[self.geometry.slot(head_ticket)];
            let idx = cell.idx.load(Ordering::Acquire);

            if idx == head_ticket + 1 {
                if self
                    .header
                    .head
                    .compare_exchange_weak(
                        head_ticket,
                        head_ticket + 1,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    let val = cell.val.load(Ordering::Relaxed);
                    // Recycle the slot for the next cycle's enqueuer.
                    cell.idx
                        .store(head_ticket + self.geometry.capacity() as u64, Ordering::Release);
                    return NonNull::new(val);
                }
                backoff.pause();
            } else if idx < head_ticket + 1 {
                return None;
            }
        }
    }
}

impl<T: Send> Segment<T> for MtqSegment<T, false> {
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
        format!("MTQueue{}", padded_suffix())
    }
}

// =============================================================================
// Bounded flavor
// =============================================================================

/// Bounded MPMC FIFO over a single MTQ ring.
pub struct BoundedMtq<T> {
    inner: MtqSegment<T, true>,
}

impl<T: Send> BoundedMtq<T> {
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
            inner: MtqSegment::with_start(capacity, 0),
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
        format!("BoundedMTQueue{}", padded_suffix())
    }
}

impl<T: Send> Queue<T> for BoundedMtq<T> {
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        BoundedMtq::push(self, item, tid)
    }

    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        BoundedMtq::pop(self, tid)
    }

    fn len(&self, tid: usize) -> usize {
        BoundedMtq::len(self, tid)
    }

    fn class_name() -> String {
        BoundedMtq::<T>::class_name()
    }
}
