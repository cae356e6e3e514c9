//! Error types for queue construction.
//!
//! The runtime error surface is deliberately tiny: a full bounded queue is a
//! `false` return from `push`, an empty queue is `None` from `pop`, and a
//! closed segment is absorbed by the linked driver. Everything else is a
//! construction-time rejection.

use thiserror::Error;

/// Errors that can occur when constructing a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The requested capacity was zero.
    #[error("capacity must be greater than zero")]
    ZeroCapacity,

    /// The requested thread count exceeds the hazard registry's fixed size.
    #[error("too many threads for the hazard registry (max: {max})")]
    TooManyThreads {
        /// The registry's compile-time thread limit.
        max: usize,
    },
}
