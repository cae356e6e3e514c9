//! Segment base: the shared head/tail/next/cluster header, the closed-bit
//! protocol, and the trait seam the linked driver drives segments through.
//!
//! ## Ticket encoding
//!
//! `head` and `tail` are 64-bit tickets obtained by fetch-add. Bit 63 of
//! `tail` is the closed flag: once set, the segment rejects new enqueues and
//! may be linked to a successor. The usable ticket domain is therefore 63
//! bits; `ticket_index` strips the flag.

use crate::invariants::debug_assert_head_le_tail;
use crate::numa;
use crossbeam_utils::CachePadded;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// MSB of `tail`: the segment no longer accepts enqueues.
pub(crate) const CLOSED_BIT: u64 = 1 << 63;

/// Soft close attempts before an enqueuer forces the closed bit.
pub(crate) const TRY_CLOSE_LIMIT: u32 = 10;

/// Inner retry budget for a dequeuer camping on one cell.
pub(crate) const DEQUEUE_RETRY_BUDGET: u32 = 4 * 1024;

/// How long a thread waits before trying to steal cluster ownership.
#[cfg(all(feature = "numa", target_os = "linux"))]
const CLUSTER_TIMEOUT_US: u64 = 100;

/// The ticket with the closed flag stripped.
#[inline]
pub(crate) fn ticket_index(raw: u64) -> u64 {
    raw & !CLOSED_BIT
}

/// Whether the closed flag is set on a raw tail value.
#[inline]
pub(crate) fn is_closed(raw: u64) -> bool {
    raw & CLOSED_BIT != 0
}

// =============================================================================
// Ring geometry
// =============================================================================

/// Capacity plus the slot-resolution strategy.
///
/// By default capacities round up to the next power of two and slots resolve
/// with a mask; the `modulo-index` feature keeps the requested capacity and
/// resolves with `%`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RingGeometry {
    capacity: usize,
    #[cfg(not(feature = "modulo-index"))]
    mask: u64,
}

impl RingGeometry {
    pub(crate) fn new(requested: usize) -> Self {
        debug_assert!(requested > 0);
        // Tickets must never wrap into the closed bit
        debug_assert!(requested as u64 <= 1 << 62);
        #[cfg(not(feature = "modulo-index"))]
        {
            let capacity = requested.next_power_of_two();
            Self {
                capacity,
                mask: capacity as u64 - 1,
            }
        }
        #[cfg(feature = "modulo-index")]
        {
            Self {
                capacity: requested,
            }
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resolve a ticket to its slot.
    #[inline]
    pub(crate) fn slot(&self, ticket: u64) -> usize {
        #[cfg(not(feature = "modulo-index"))]
        {
            (ticket & self.mask) as usize
        }
        #[cfg(feature = "modulo-index")]
        {
            (ticket % self.capacity as u64) as usize
        }
    }
}

// =============================================================================
// Segment header
// =============================================================================

/// The per-segment atomics, each on its own cache line.
///
/// Opaque outside the crate; the linked driver and the segment protocols
/// are its only clients.
pub struct SegmentHeader<S> {
    /// Next dequeue ticket.
    pub(crate) head: CachePadded<AtomicU64>,
    /// Next enqueue ticket; bit 63 is the closed flag.
    pub(crate) tail: CachePadded<AtomicU64>,
    /// Successor segment in a linked chain, null for the current tail.
    pub(crate) next: CachePadded<AtomicPtr<S>>,
    /// Last observed NUMA cluster; a locality hint, never a correctness gate.
    #[cfg_attr(not(all(feature = "numa", target_os = "linux")), allow(dead_code))]
    pub(crate) cluster: CachePadded<AtomicU64>,
}

impl<S> SegmentHeader<S> {
    pub(crate) fn new(start: u64) -> Self {
        let header = Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            next: CachePadded::new(AtomicPtr::new(std::ptr::null_mut())),
            cluster: CachePadded::new(AtomicU64::new(if numa::numa_available() {
                numa::current_cluster()
            } else {
                0
            })),
        };
        header.set_start_index(start);
        header
    }

    #[inline]
    pub(crate) fn head_index(&self) -> u64 {
        self.head.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn tail_index(&self) -> u64 {
        ticket_index(self.tail.load(Ordering::SeqCst))
    }

    /// Where a successor segment's ring begins: one past the last ticket
    /// this segment could serve, so the chain's ticket stream stays monotone.
    #[inline]
    pub(crate) fn next_start_index(&self) -> u64 {
        self.tail_index()
    }

    /// Re-seed both counters (fresh segments joining a chain mid-stream).
    pub(crate) fn set_start_index(&self, start: u64) {
        self.head.store(start, Ordering::Relaxed);
        self.tail.store(start, Ordering::Relaxed);
    }

    /// Try to seal the segment at `tail_ticket`.
    ///
    /// The soft path succeeds only if no later enqueuer has taken a ticket;
    /// `force` sets the bit unconditionally. Returns whether the closed bit
    /// is now known set.
    pub(crate) fn close_segment(&self, tail_ticket: u64, force: bool) -> bool {
        if force {
            self.tail.fetch_or(CLOSED_BIT, Ordering::SeqCst);
            true
        } else {
            self.tail
                .compare_exchange(
                    tail_ticket + 1,
                    (tail_ticket + 1) | CLOSED_BIT,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
        }
    }

    /// Pull `tail` up to `head` after over-draining dequeuers overshot it.
    ///
    /// A closed tail is never raised: its raw value compares above any head.
    pub(crate) fn fix_state(&self) {
        loop {
            let t = self.tail.load(Ordering::SeqCst);
            let h = self.head.load(Ordering::SeqCst);
            if self.tail.load(Ordering::SeqCst) != t {
                continue;
            }
            if h > t {
                if self
                    .tail
                    .compare_exchange(t, h, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    break;
                }
                continue;
            }
            break;
        }
        #[cfg(debug_assertions)]
        if !is_closed(self.tail.load(Ordering::SeqCst)) {
            debug_assert_head_le_tail!(self.head_index(), self.tail_index());
        }
    }

    /// Approximate occupancy; clamped at zero when dequeuers overshot.
    pub(crate) fn length(&self) -> usize {
        let t = self.tail_index();
        let h = self.head_index();
        if t > h {
            (t - h) as usize
        } else {
            0
        }
    }

    #[cfg_attr(not(feature = "cautious-dequeue"), allow(dead_code))]
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head_index() >= self.tail_index()
    }

    /// Spin until this thread's cluster owns the segment, or take ownership.
    ///
    /// Pure locality bias: operations are correct regardless of the winner,
    /// so losing the ownership CAS just re-checks. The short sleep keeps
    /// cross-cluster threads from thrashing the cluster word.
    #[cfg(all(feature = "numa", target_os = "linux"))]
    pub(crate) fn safe_cluster(&self) {
        loop {
            let c = self.cluster.load(Ordering::SeqCst);
            let mine = numa::current_cluster();
            if c != mine {
                std::thread::sleep(std::time::Duration::from_micros(CLUSTER_TIMEOUT_US));
                if self
                    .cluster
                    .compare_exchange(c, mine, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    continue;
                }
            }
            return;
        }
    }

    #[cfg(not(all(feature = "numa", target_os = "linux")))]
    #[inline]
    pub(crate) fn safe_cluster(&self) {}
}

// =============================================================================
// The segment capability
// =============================================================================

/// What the linked driver needs from a bounded ring to run it as one link of
/// an unbounded chain: construction at an arbitrary start ticket, the shared
/// header (for `next`, indices and close state), and enqueue/dequeue that
/// report closure/emptiness instead of blocking.
pub trait Segment<T>: Send + Sync + Sized {
    /// Construct a segment whose ring begins at ticket `start`.
    fn with_start(capacity: usize, start: u64) -> Self;

    /// The shared header embedded in the segment.
    fn header(&self) -> &SegmentHeader<Self>;

    /// `false` means the segment is closed (never merely full).
    fn enqueue(&self, item: NonNull<T>, tid: usize) -> bool;

    /// `None` means the segment is observed empty.
    fn dequeue(&self, tid: usize) -> Option<NonNull<T>>;

    /// Stable per-flavor identifier, used in `Linked<...>` names.
    fn segment_name() -> String;
}
