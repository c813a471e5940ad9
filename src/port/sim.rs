//! Host simulation port
//!
//! Clock and interrupt flag are per thread, so every test thread drives
//! its own simulated board.
//!
//! Author: Moroya Sakamoto

use std::cell::Cell;

use super::Port;

std::thread_local! {
    static NOW_MS: Cell<u32> = const { Cell::new(0) };
    static IN_ISR: Cell<bool> = const { Cell::new(false) };
}

/// Simulated board: settable clock, simulated interrupt context
pub struct SimPort;

impl SimPort {
    /// Clock back to zero, outside any interrupt.
    pub fn reset() {
        NOW_MS.with(|now| now.set(0));
        IN_ISR.with(|flag| flag.set(false));
    }

    pub fn set_now(ms: u32) {
        NOW_MS.with(|now| now.set(ms));
    }

    pub fn advance(ms: u32) {
        NOW_MS.with(|now| now.set(now.get().wrapping_add(ms)));
    }

    /// Run `f` as if it were an interrupt handler.
    pub fn interrupt<R>(f: impl FnOnce() -> R) -> R {
        let outer = IN_ISR.with(|flag| flag.replace(true));
        let result = f();
        IN_ISR.with(|flag| flag.set(outer));
        result
    }
}

impl Port for SimPort {
    fn now_ms() -> u32 {
        NOW_MS.with(Cell::get)
    }

    fn in_interrupt() -> bool {
        IN_ISR.with(Cell::get)
    }
}
