//! Mutex adapter: a lock-guarded FIFO in the same interface as the
//! lock-free queues.
//!
//! Exists as the correctness baseline — the one implementation whose
//! semantics a test suite can treat as the reference. The thread id is
//! accepted and ignored; the mutex serialises everything.

use crate::{Queue, QueueError};
use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};

/// Lock-guarded FIFO; `BOUNDED` selects whether `push` rejects at capacity.
pub struct MuxQueue<T, const BOUNDED: bool> {
    inner: Mutex<VecDeque<NonNull<T>>>,
    max_size: usize,
}

unsafe impl<T: Send, const BOUNDED: bool> Send for MuxQueue<T, BOUNDED> {}
unsafe impl<T: Send, const BOUNDED: bool> Sync for MuxQueue<T, BOUNDED> {}

impl<T: Send, const BOUNDED: bool> MuxQueue<T, BOUNDED> {
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
            inner: Mutex::new(VecDeque::new()),
            max_size: capacity,
        })
    }

    pub fn push(&self, item: NonNull<T>, _tid: usize) -> bool {
        let mut q = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if BOUNDED && q.len() >= self.max_size {
            return false;
        }
        q.push_back(item);
        true
    }

    pub fn pop(&self, _tid: usize) -> Option<NonNull<T>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub fn len(&self, _tid: usize) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self, tid: usize) -> bool {
        self.len(tid) == 0
    }
}

/// Bounded lock-guarded FIFO.
pub type BoundedMuxQueue<T> = MuxQueue<T, true>;

impl<T: Send> BoundedMuxQueue<T> {
    pub fn class_name() -> String {
        "BoundedMuxQueue".to_string()
    }
}

impl<T: Send> Queue<T> for BoundedMuxQueue<T> {
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        MuxQueue::push(self, item, tid)
    }

    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        MuxQueue::pop(self, tid)
    }

    fn len(&self, tid: usize) -> usize {
        MuxQueue::len(self, tid)
    }

    fn class_name() -> String {
        BoundedMuxQueue::<T>::class_name()
    }
}

/// Unbounded lock-guarded FIFO in the linked-queue interface.
pub struct LinkedMuxQueue<T> {
    inner: MuxQueue<T, false>,
}

impl<T: Send> LinkedMuxQueue<T> {
    pub fn new(capacity: usize, max_threads: usize) -> Result<Self, QueueError> {
        Ok(Self {
            inner: MuxQueue::new(capacity, max_threads)?,
        })
    }

    pub fn push(&self, item: NonNull<T>, tid: usize) {
        let accepted = self.inner.push(item, tid);
        debug_assert!(accepted);
    }

    pub fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        self.inner.pop(tid)
    }

    pub fn len(&self, tid: usize) -> usize {
        self.inner.len(tid)
    }

    pub fn is_empty(&self, tid: usize) -> bool {
        self.len(tid) == 0
    }

    pub fn class_name() -> String {
        "LinkedMuxQueue".to_string()
    }
}

impl<T: Send> Queue<T> for LinkedMuxQueue<T> {
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        LinkedMuxQueue::push(self, item, tid);
        true
    }

    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        LinkedMuxQueue::pop(self, tid)
    }

    fn len(&self, tid: usize) -> usize {
        LinkedMuxQueue::len(self, tid)
    }

    fn class_name() -> String {
        LinkedMuxQueue::<T>::class_name()
    }
}
