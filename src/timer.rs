//! Millisecond ticks — wrap-safe deadline arithmetic and an ISR-fed ticker
//!
//! Tick values are `u32` milliseconds that wrap after ~49.7 days. Deadlines
//! are compared through the signed wrapping difference, which stays correct
//! as long as a sleep is shorter than half the counter range.
//!
//! Author: Moroya Sakamoto

use core::cell::Cell;

use critical_section::Mutex;

/// `wake_at` value meaning "not sleeping"
pub const NOT_SLEEPING: u32 = 0;

/// Longest sleep the signed tick difference can represent
pub const MAX_SLEEP_MS: u32 = i32::MAX as u32;

/// Absolute wake tick for a sleep of `duration_ms` starting at `now`.
///
/// Durations above [`MAX_SLEEP_MS`] are clamped to it. A result equal to
/// [`NOT_SLEEPING`] is pushed one tick later.
pub fn wake_tick(now: u32, duration_ms: u32) -> u32 {
    match now.wrapping_add(duration_ms.min(MAX_SLEEP_MS)) {
        NOT_SLEEPING => NOT_SLEEPING + 1,
        tick => tick,
    }
}

/// Has `now` reached `deadline`?
pub fn deadline_reached(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// Monotonic millisecond counter advanced from a timer interrupt
///
/// Guarded by a critical section: RV32IMC and ARMv6-M have no atomic
/// read-modify-write.
pub struct Ticker {
    ms: Mutex<Cell<u32>>,
}

impl Ticker {
    pub const fn new() -> Self {
        Self {
            ms: Mutex::new(Cell::new(0)),
        }
    }

    /// Advance by `ms` milliseconds (timer interrupt side)
    pub fn advance(&self, ms: u32) {
        critical_section::with(|cs| {
            let ticks = self.ms.borrow(cs);
            ticks.set(ticks.get().wrapping_add(ms));
        });
    }

    /// Current tick
    pub fn now_ms(&self) -> u32 {
        critical_section::with(|cs| self.ms.borrow(cs).get())
    }

    /// Overwrite the counter
    pub fn set(&self, ms: u32) {
        critical_section::with(|cs| self.ms.borrow(cs).set(ms));
    }

    /// Elapsed milliseconds since a reference tick
    pub fn elapsed_since(&self, reference: u32) -> u32 {
        self.now_ms().wrapping_sub(reference)
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}
