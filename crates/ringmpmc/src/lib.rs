//! RingMPMC - Lock-Free Multi-Producer Multi-Consumer FIFO Queues
//!
//! A family of MPMC queues of pointer-sized payloads built from three
//! bounded ring segments (CRQ, PRQ, MTQ), a linked driver that chains
//! closed segments into unbounded queues, an FAA array queue, and the
//! hazard-pointer reclamation that makes unlinking segments sound.
//!
//! # Key Features
//!
//! - Fetch-add tickets on head/tail: wait-free in the common case,
//!   linearisable at the ticket counters
//! - Closed-bit segment sealing with lazy chain extension
//! - Per-queue hazard-pointer registry (no global state)
//! - Cache-line padded cells and headers (feature-selectable packing)
//! - A mutex-guarded reference queue for correctness baselining
//!
//! # Payload model
//!
//! Payloads are opaque `NonNull<T>` pointers to caller-owned memory; the
//! queue never dereferences them and never frees them. The PRQ variants
//! additionally require payload pointers to be at least 2-aligned (odd
//! representations are reserved for its enqueue protocol).
//!
//! # Thread ids
//!
//! Every operation takes a thread id in `[0, max_threads)` indexing the
//! queue's hazard registry. Supplying the same id from two simultaneously
//! active threads is undefined behavior of the queue.
//!
//! # Example
//!
//! ```
//! use ringmpmc::{Lcrq, Queue};
//! use std::ptr::NonNull;
//!
//! let queue = Lcrq::<u64>::new(128, 4).unwrap();
//!
//! // Payloads are caller-owned; the queue moves pointers, never values.
//! let mut slots: Vec<u64> = (0..10).collect();
//! for slot in &mut slots {
//!     queue.push(NonNull::from(slot), 0);
//! }
//! for expected in 0..10 {
//!     let got = queue.pop(1).unwrap();
//!     assert_eq!(unsafe { *got.as_ref() }, expected);
//! }
//! assert!(queue.pop(1).is_none());
//! assert_eq!(queue.len(1), 0);
//! ```

mod backoff;
mod cell;
mod crq;
mod error;
mod faa;
mod hazard;
mod invariants;
mod linked;
mod metrics;
mod mtq;
mod mux;
mod numa;
mod prq;
mod segment;

pub use backoff::Backoff;
pub use crq::{BoundedCrq, CrqSegment};
pub use error::QueueError;
pub use faa::FaaQueue;
pub use hazard::MAX_THREADS;
pub use linked::LinkedRingQueue;
pub use metrics::MetricsSnapshot;
pub use mtq::{BoundedMtq, MtqSegment};
pub use mux::{BoundedMuxQueue, LinkedMuxQueue, MuxQueue};
pub use prq::{BoundedPrq, PrqSegment};
pub use segment::{Segment, SegmentHeader};

use std::ptr::NonNull;

/// The queue-family interface shared by every member.
///
/// `push` reports `false` only on bounded queues observing a full ring;
/// unbounded members always return `true`. `pop` reports emptiness as
/// `None`. `len` is approximate under concurrency.
pub trait Queue<T> {
    fn push(&self, item: NonNull<T>, tid: usize) -> bool;
    fn pop(&self, tid: usize) -> Option<NonNull<T>>;
    fn len(&self, tid: usize) -> usize;
    /// Stable identifier for reporting.
    fn class_name() -> String;
}

/// Unbounded CRQ: linked chain of double-word-CAS ring segments.
pub type Lcrq<T> = LinkedRingQueue<T, CrqSegment<T, false>>;

/// Unbounded PRQ: linked chain of single-word-CAS ring segments.
pub type Lprq<T> = LinkedRingQueue<T, PrqSegment<T, false>>;

/// Unbounded MTQ: linked chain of ticket-matching ring segments.
pub type Lmtq<T> = LinkedRingQueue<T, MtqSegment<T, false>>;

/// Name suffix advertising the active cell layout.
pub(crate) fn padded_suffix() -> &'static str {
    if cfg!(feature = "unpadded-cells") {
        ""
    } else {
        "/padded"
    }
}
