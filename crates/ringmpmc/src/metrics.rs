//! Segment-churn counters for the unbounded queues.
//!
//! Kept off the per-operation hot path: only the cold allocate/retire edges
//! touch these, so they are always on. `snapshot()` gives a consistent-enough
//! view for tests and monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters updated on the segment allocate/retire paths.
#[derive(Debug, Default)]
pub struct Metrics {
    segments_allocated: AtomicU64,
    segments_retired: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Segments (or FAA nodes) allocated past the initial sentinel.
    pub segments_allocated: u64,
    /// Segments handed to the hazard registry for deferred deletion.
    pub segments_retired: u64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_segment_allocated(&self) {
        self.segments_allocated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_segment_retired(&self) {
        self.segments_retired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            segments_allocated: self.segments_allocated.load(Ordering::Relaxed),
            segments_retired: self.segments_retired.load(Ordering::Relaxed),
        }
    }
}
