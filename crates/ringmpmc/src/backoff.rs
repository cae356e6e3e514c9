use std::hint;

/// Bounded exponential busy-wait backoff.
///
/// Smooths CAS contention on the ticket counters: each failed attempt spins
/// with PAUSE hints, doubling the spin count up to a fixed ceiling. Pure
/// spinning, no yield to the OS; the ticket-matching ring never parks.
#[derive(Debug)]
pub struct Backoff {
    spins: u32,
}

impl Backoff {
    const SPIN_MIN: u32 = 128;
    const SPIN_MAX: u32 = 1024;

    /// Creates a new backoff instance at the minimum spin count.
    #[inline]
    pub fn new() -> Self {
        Self {
            spins: Self::SPIN_MIN,
        }
    }

    /// Busy-wait for the current spin count, then double it (capped).
    #[inline]
    pub fn pause(&mut self) {
        for _ in 0..self.spins {
            hint::spin_loop();
        }
        self.spins = (self.spins << 1).min(Self::SPIN_MAX);
    }

    /// Reset for the next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.spins = Self::SPIN_MIN;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
