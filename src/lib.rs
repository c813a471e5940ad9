//! microco — Cooperative Coroutines for Bare-Metal MCUs
//!
//! Stackful coroutines on one core, no heap:
//! - Caller-supplied stacks, registered into a static registry
//! - Explicit yield, tick-based sleep, interrupt-safe resume
//! - A loop pass the application idle loop calls to run whatever is due
//! - Context switch in a handful of instructions per architecture
//!   (Cortex-M, RISC-V 32, x86-64, AArch64)
//!
//! ```ignore
//! static SCHEDULER: Scheduler<CortexM> = Scheduler::new();
//!
//! fn blink() {
//!     loop {
//!         led_toggle();
//!         SCHEDULER.sleep_ms(500);
//!     }
//! }
//!
//! let stack = cortex_m::singleton!(: [u8; 1024] = [0; 1024]).unwrap();
//! SCHEDULER.init(stack, blink).unwrap();
//! loop {
//!     SCHEDULER.run_once();
//! }
//! ```
//!
//! Author: Moroya Sakamoto

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod arch;
pub mod context;
pub mod coroutine;
pub mod port;
pub mod scheduler;
pub mod signal;
pub mod timer;

#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(test)]
mod testing;

pub use context::{SavedPoint, MIN_STACK, STACK_PAINT};
pub use coroutine::{fatal, CoId, EntryFn, Event, Misuse, Status};
pub use port::Port;
#[cfg(feature = "cortex-m")]
pub use port::{CortexM, SYSTICK};
#[cfg(any(test, feature = "std"))]
pub use port::SimPort;
pub use scheduler::{Scheduler, MAX_COROUTINES};
pub use signal::{Busy, Completion};
pub use timer::Ticker;
