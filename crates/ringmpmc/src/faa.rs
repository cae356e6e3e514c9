//! FAA array queue: an unbounded MPMC FIFO over linked nodes of append-only
//! slots.
//!
//! A degenerate cousin of the ring segments: slots are claimed by fetch-add
//! on per-node enqueue/dequeue indices and never recycled, so a node is
//! sealed by index exhaustion instead of a close bit. Dequeuers mark
//! consumed slots by exchanging in a per-queue *taken* sentinel — a private
//! heap allocation no payload pointer can equal. Drained nodes are unlinked
//! and handed to the hazard registry.

use crate::hazard::{HazardPointers, HP_HEAD, HP_TAIL, MAX_THREADS};
use crate::cell::PlainCell;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::{padded_suffix, Queue, QueueError};
use crossbeam_utils::CachePadded;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// Spin budget for the race where an enqueuer has reserved a slot but has
/// not yet stored its value.
const RESERVED_SPIN: u32 = 4 * 1024;

struct FaaNode<T> {
    deqidx: CachePadded<AtomicU64>,
    enqidx: CachePadded<AtomicU64>,
    next: CachePadded<AtomicPtr<FaaNode<T>>>,
    /// Global ticket at which this node's slot 0 lives; keeps `len`
    /// meaningful across node hops.
    start_index_offset: u64,
    cells: Box<[PlainCell<T>]>,
}

impl<T> FaaNode<T> {
    /// A fresh node, optionally prefilled with one item at slot 0 (the
    /// allocating enqueuer's own, so its enqueue cannot fail).
    fn new(first: *mut T, start_index_offset: u64, capacity: usize) -> Self {
        let cells: Box<[PlainCell<T>]> = (0..capacity).map(|_| PlainCell::new()).collect();
        let enqidx = if first.is_null() { 0 } else { 1 };
        if !first.is_null() {
            cells[0].val.store(first, Ordering::Relaxed);
        }
        Self {
            deqidx: CachePadded::new(AtomicU64::new(0)),
            enqidx: CachePadded::new(AtomicU64::new(enqidx)),
            next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            start_index_offset,
            cells,
        }
    }
}

/// Unbounded MPMC FIFO of pointer payloads over linked FAA nodes.
pub struct FaaQueue<T> {
    capacity: usize,
    hp: HazardPointers<FaaNode<T>>,
    head: CachePadded<AtomicPtr<FaaNode<T>>>,
    tail: CachePadded<AtomicPtr<FaaNode<T>>>,
    /// Consumed-slot marker; distinct from every legitimate payload because
    /// the queue owns the allocation. Freed on drop.
    taken: *mut T,
    metrics: Metrics,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send> Send for FaaQueue<T> {}
unsafe impl<T: Send> Sync for FaaQueue<T> {}

impl<T> std::fmt::Debug for FaaQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaaQueue").finish_non_exhaustive()
    }
}

impl<T: Send> FaaQueue<T> {
    /// Create a queue with `capacity` slots per node.
    pub fn new(capacity: usize, max_threads: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        if max_threads > MAX_THREADS {
            return Err(QueueError::TooManyThreads { max: MAX_THREADS });
        }
        let sentinel = Box::into_raw(Box::new(FaaNode::new(ptr::null_mut(), 0, capacity)));
        Ok(Self {
            capacity,
            hp: HazardPointers::new(2, max_threads),
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            taken: Box::into_raw(Box::new(0u64)).cast::<T>(),
            metrics: Metrics::new(),
            _marker: PhantomData,
        })
    }

    /// Enqueue; always succeeds (a sealed tail node grows the chain).
    pub fn push(&self, item: NonNull<T>, tid: usize) {
        loop {
            let ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
            // Safety: protected above; the registry defers any free.
            let node = unsafe { &*ltail };
            let idx = node.enqidx.fetch_add(1, Ordering::SeqCst);

            if idx >= self.capacity as u64 {
                // Sealed by exhaustion; help or extend.
                if ltail != self.tail.load(Ordering::SeqCst) {
                    continue;
                }
                let lnext = node.next.load(Ordering::SeqCst);
                if lnext.is_null() {
                    let new_node = Box::into_raw(Box::new(FaaNode::new(
                        item.as_ptr(),
                        node.start_index_offset + self.capacity as u64,
                        self.capacity,
                    )));
                    if node
                        .next
                        .compare_exchange(
                            ptr::null_mut(),
                            new_node,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        )
                        .is_ok()
                    {
                        let _ = self.tail.compare_exchange(
                            ltail,
                            new_node,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        );
                        self.metrics.add_segment_allocated();
                        self.hp.clear_slot(HP_TAIL, tid);
                        return;
                    }
                    // Lost the link race; the item is still ours.
                    drop(unsafe { Box::from_raw(new_node) });
                } else {
                    let _ = self.tail.compare_exchange(
                        ltail,
                        lnext,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                }
                continue;
            }

            if node.cells[idx as usize]
                .val
                .compare_exchange(
                    ptr::null_mut(),
                    item.as_ptr(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                self.hp.clear_slot(HP_TAIL, tid);
                return;
            }
        }
    }

    /// Dequeue; `None` when the queue is observed empty.
    pub fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        let mut item: *mut T = ptr::null_mut();
        let mut lhead = self.hp.protect(HP_HEAD, &self.head, tid);

        #[cfg(feature = "cautious-dequeue")]
        {
            let node = unsafe { &*lhead };
            if node.deqidx.load(Ordering::SeqCst) >= node.enqidx.load(Ordering::SeqCst)
                && node.next.load(Ordering::SeqCst).is_null()
            {
                self.hp.clear_slot(HP_HEAD, tid);
                return None;
            }
        }

        loop {
            // Safety: protected; see above.
            let node = unsafe { &*lhead };
            let idx = node.deqidx.fetch_add(1, Ordering::SeqCst);

            if idx >= self.capacity as u64 {
                // This node is drained; hop to the successor if any.
                let lnext = node.next.load(Ordering::SeqCst);
                if lnext.is_null() {
                    break;
                }
                if self
                    .head
                    .compare_exchange(lhead, lnext, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    self.metrics.add_segment_retired();
                    // Safety: unlinked above, exactly once, by the winning CAS.
                    unsafe { self.hp.retire(lhead, tid) };
                }
                lhead = self.hp.protect(HP_HEAD, &self.head, tid);
                continue;
            }

            let cell = &node.cells[idx as usize];
            if cell.val.load(Ordering::SeqCst).is_null()
                && idx < node.enqidx.load(Ordering::SeqCst)
            {
                // An enqueuer owns this slot but hasn't stored yet.
                for _ in 0..RESERVED_SPIN {
                    if !cell.val.load(Ordering::SeqCst).is_null() {
                        break;
                    }
                }
            }

            let got = cell.val.swap(self.taken, Ordering::SeqCst);
            if !got.is_null() {
                item = got;
                break;
            }

            let t = node.enqidx.load(Ordering::SeqCst);
            if idx + 1 >= t {
                if !node.next.load(Ordering::SeqCst).is_null() {
                    continue;
                }
                // Advance enqidx past the spent dequeue ticket so a later
                // enqueuer cannot write into a slot nobody will read.
                let _ = node
                    .enqidx
                    .compare_exchange(t, idx + 1, Ordering::SeqCst, Ordering::SeqCst);
                break;
            }
        }

        self.hp.clear_slot(HP_HEAD, tid);
        NonNull::new(item)
    }

    /// Approximate occupancy across the node chain; an estimate, not a
    /// snapshot.
    pub fn len(&self, tid: usize) -> usize {
        let lhead = self.hp.protect(HP_HEAD, &self.head, tid);
        let ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
        // Safety: both protected.
        let (h_node, t_node) = unsafe { (&*lhead, &*ltail) };
        let t = t_node.enqidx.load(Ordering::SeqCst).min(self.capacity as u64)
            + t_node.start_index_offset;
        let h = h_node.deqidx.load(Ordering::SeqCst).min(self.capacity as u64)
            + h_node.start_index_offset;
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

    /// Node-churn counters (allocations past the sentinel, retirements).
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn class_name() -> String {
        format!("FAAArrayQueue{}", padded_suffix())
    }
}

impl<T> Drop for FaaQueue<T> {
    fn drop(&mut self) {
        // Payloads are caller-owned; only the node chain and the taken
        // sentinel belong to the queue. Nodes already retired live in the
        // registry's lists and are freed when `hp` drops.
        let mut node = self.head.load(Ordering::Relaxed);
        while !node.is_null() {
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            drop(unsafe { Box::from_raw(node) });
            node = next;
        }
        drop(unsafe { Box::from_raw(self.taken.cast::<u64>()) });
    }
}

impl<T: Send> Queue<T> for FaaQueue<T> {
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        FaaQueue::push(self, item, tid);
        true
    }

    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        FaaQueue::pop(self, tid)
    }

    fn len(&self, tid: usize) -> usize {
        FaaQueue::len(self, tid)
    }

    fn class_name() -> String {
        FaaQueue::<T>::class_name()
    }
}
