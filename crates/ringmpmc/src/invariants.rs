//! Debug assertion macros for queue invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so there is
//! zero overhead in release builds.
//!
//! Used by the ring segments, the FAA queue and the linked driver.

// =============================================================================
// Ticket headroom
// =============================================================================

/// Assert that a ticket obtained by fetch-add stays clear of the closed bit.
///
/// **Invariant**: tickets live in a 63-bit domain; bit 63 of `tail` is the
/// closed flag. At one billion operations per second it takes ~292 years to
/// exhaust the domain, so a firing here means a corrupted counter, not real
/// overflow.
macro_rules! debug_assert_ticket_headroom {
    ($ticket:expr) => {
        debug_assert!(
            $ticket < (1u64 << 62),
            "ticket {} approaching the closed-bit domain boundary",
            $ticket
        )
    };
}

// =============================================================================
// Head / tail consistency
// =============================================================================

/// Assert that head does not exceed the unpacked tail index.
///
/// **Invariant**: `head <= tail_index(tail)` after `fix_state()`
macro_rules! debug_assert_head_le_tail {
    ($head:expr, $tail_index:expr) => {
        debug_assert!(
            $head <= $tail_index,
            "head {} past tail index {} after state fix",
            $head,
            $tail_index
        )
    };
}

// =============================================================================
// Payload alignment (PRQ bottom-sentinel discipline)
// =============================================================================

/// Assert that a payload pointer has its low bit clear.
///
/// **Invariant**: bottom sentinels occupy odd pointer representations, so
/// every legitimate payload must be at least 2-aligned.
macro_rules! debug_assert_untagged_payload {
    ($ptr:expr) => {
        debug_assert!(
            ($ptr as usize) & 1 == 0,
            "payload pointer {:p} has its low bit set; it would be taken for an in-progress sentinel",
            $ptr
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_head_le_tail;
pub(crate) use debug_assert_ticket_headroom;
pub(crate) use debug_assert_untagged_payload;
