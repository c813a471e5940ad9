//! Platform port — tick source and interrupt-context detection
//!
//! The scheduler asks the port two questions: what time it is, and whether
//! the caller is an interrupt handler. Both are associated functions so a
//! `Scheduler<P>` can be built in a `static`.
//!
//! Author: Moroya Sakamoto

#[cfg(feature = "cortex-m")]
mod cortex;
#[cfg(any(test, feature = "std"))]
mod sim;

#[cfg(feature = "cortex-m")]
pub use self::cortex::{CortexM, SYSTICK};
#[cfg(any(test, feature = "std"))]
pub use self::sim::SimPort;

/// Board support the scheduler needs
pub trait Port {
    /// Monotonic millisecond tick, wrapping at `u32::MAX`
    fn now_ms() -> u32;

    /// True while executing inside an interrupt or exception handler
    fn in_interrupt() -> bool;
}
