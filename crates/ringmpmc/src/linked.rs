//! Linked-ring driver: turns any closeable bounded segment into an
//! unbounded MPMC queue.
//!
//! The queue is a singly linked chain of segments. Enqueuers work on the
//! tail segment; when it reports closure they allocate a successor seeded at
//! the closed segment's tail index (so the chain carries one monotone ticket
//! stream), enqueue into it — a fresh segment cannot refuse — and race to
//! CAS it into `next` and then `tail`. Losers free their segment and retry
//! on the winner's. Dequeuers drain the head segment and advance `head`
//! past drained segments, retiring them through the hazard registry.
//!
//! ## Reclamation protocol
//!
//! Every traversal hop re-protects before dereferencing: publish the
//! observed pointer, then re-check it against the source. Between a
//! successful re-check and the matching clear, the scanner cannot free the
//! pointee, so `head`/`tail` segments are always safe to touch.

use crate::hazard::{HazardPointers, HP_HEAD, HP_TAIL, MAX_THREADS};
use crate::invariants::debug_assert_ticket_headroom;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::segment::Segment;
use crate::{Queue, QueueError};
use crossbeam_utils::CachePadded;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

/// Unbounded MPMC FIFO over a chain of `S` segments.
pub struct LinkedRingQueue<T, S: Segment<T>> {
    segment_capacity: usize,
    head: CachePadded<AtomicPtr<S>>,
    tail: CachePadded<AtomicPtr<S>>,
    hp: HazardPointers<S>,
    metrics: Metrics,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, S: Segment<T>> Send for LinkedRingQueue<T, S> {}
unsafe impl<T: Send, S: Segment<T>> Sync for LinkedRingQueue<T, S> {}

impl<T: Send, S: Segment<T>> LinkedRingQueue<T, S> {
    /// Create a queue whose segments hold `capacity` slots each.
    pub fn new(capacity: usize, max_threads: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        if max_threads > MAX_THREADS {
            return Err(QueueError::TooManyThreads { max: MAX_THREADS });
        }
        let sentinel = Box::into_raw(Box::new(S::with_start(capacity, 0)));
        Ok(Self {
            segment_capacity: capacity,
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            hp: HazardPointers::new(2, max_threads),
            metrics: Metrics::new(),
            _marker: PhantomData,
        })
    }

    /// Enqueue; always succeeds, growing the chain when the tail closes.
    pub fn push(&self, item: NonNull<T>, tid: usize) {
        let mut ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
        loop {
            // Re-check: a stale tail may already be retired once we lose
            // the publication race.
            let ltail2 = self.tail.load(Ordering::SeqCst);
            if ltail2 != ltail {
                ltail = self.hp.protect_ptr(HP_TAIL, ltail2, tid);
                continue;
            }

            // Safety: protected and re-checked above.
            let seg = unsafe { &*ltail };

            let lnext = seg.header().next.load(Ordering::SeqCst);
            if !lnext.is_null() {
                // Help a lagging winner advance the shared tail.
                match self
                    .tail
                    .compare_exchange(ltail, lnext, Ordering::SeqCst, Ordering::SeqCst)
                {
                    Ok(_) => ltail = self.hp.protect_ptr(HP_TAIL, lnext, tid),
                    Err(_) => ltail = self.hp.protect(HP_TAIL, &self.tail, tid),
                }
                continue;
            }

            if seg.enqueue(item, tid) {
                self.hp.clear_slot(HP_TAIL, tid);
                return;
            }

            // Segment closed: extend the chain.
            let start = seg.header().next_start_index();
            debug_assert_ticket_headroom!(start);
            let new_tail = Box::into_raw(Box::new(S::with_start(self.segment_capacity, start)));
            // Safety: not yet linked, exclusively ours.
            let accepted = unsafe { &*new_tail }.enqueue(item, tid);
            debug_assert!(accepted, "a fresh segment accepts its seeding enqueue");

            match seg.header().next.compare_exchange(
                ptr::null_mut(),
                new_tail,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    let _ = self.tail.compare_exchange(
                        ltail,
                        new_tail,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    self.metrics.add_segment_allocated();
                    self.hp.clear_slot(HP_TAIL, tid);
                    return;
                }
                Err(observed) => {
                    // Safety: the loser's segment was never published.
                    drop(unsafe { Box::from_raw(new_tail) });
                    ltail = self.hp.protect_ptr(HP_TAIL, observed, tid);
                }
            }
        }
    }

    /// Dequeue; `None` when the whole chain is observed empty.
    pub fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        let mut lhead = self.hp.protect(HP_HEAD, &self.head, tid);
        loop {
            let lhead2 = self.head.load(Ordering::SeqCst);
            if lhead2 != lhead {
                lhead = self.hp.protect_ptr(HP_HEAD, lhead2, tid);
                continue;
            }

            // Safety: protected and re-checked above.
            let seg = unsafe { &*lhead };

            let mut item = seg.dequeue(tid);
            if item.is_none() {
                let lnext = seg.header().next.load(Ordering::SeqCst);
                if !lnext.is_null() {
                    // A producer may have slipped a value in between the
                    // empty observation and the successor link; retry once.
                    item = seg.dequeue(tid);
                    if item.is_none() {
                        match self.head.compare_exchange(
                            lhead,
                            lnext,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        ) {
                            Ok(_) => {
                                self.metrics.add_segment_retired();
                                // Safety: unlinked by the winning CAS above.
                                unsafe { self.hp.retire(lhead, tid) };
                                lhead = self.hp.protect_ptr(HP_HEAD, lnext, tid);
                            }
                            Err(_) => {
                                lhead = self.hp.protect_ptr(HP_HEAD, lhead, tid);
                            }
                        }
                        continue;
                    }
                }
            }

            self.hp.clear_slot(HP_HEAD, tid);
            return item;
        }
    }

    /// Approximate occupancy: tail index of the tail segment minus head
    /// index of the head segment. An estimate, not a snapshot.
    pub fn len(&self, tid: usize) -> usize {
        let lhead = self.hp.protect(HP_HEAD, &self.head, tid);
        let ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
        // Safety: both protected.
        let t = unsafe { &*ltail }.header().tail_index();
        let h = unsafe { &*lhead }.header().head_index();
        self.hp.clear(tid);
        if t > h {
            (t - h) as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self, tid: usize) -> bool {
        self.len(tid) == 0
    }

    /// Segment-churn counters (allocations past the sentinel, retirements).
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn class_name() -> String {
        format!("Linked{}", S::segment_name())
    }
}

impl<T, S: Segment<T>> Drop for LinkedRingQueue<T, S> {
    fn drop(&mut self) {
        // Payloads are caller-owned; the queue owns only the chain.
        // Segments already retired are freed when the registry drops.
        let mut seg = self.head.load(Ordering::Relaxed);
        while !seg.is_null() {
            let next = unsafe { (*seg).header().next.load(Ordering::Relaxed) };
            drop(unsafe { Box::from_raw(seg) });
            seg = next;
        }
    }
}

impl<T: Send, S: Segment<T>> Queue<T> for LinkedRingQueue<T, S> {
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        LinkedRingQueue::push(self, item, tid);
        true
    }

    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        LinkedRingQueue::pop(self, tid)
    }

    fn len(&self, tid: usize) -> usize {
        LinkedRingQueue::len(self, tid)
    }

    fn class_name() -> String {
        LinkedRingQueue::<T, S>::class_name()
    }
}
