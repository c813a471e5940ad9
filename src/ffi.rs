//! C ABI — `co_*` calls over one global scheduler
//!
//! For C firmware linking the crate as a static library. The firmware
//! provides the tick and the interrupt test:
//!
//! ```c
//! uint32_t microco_now_ms(void);
//! bool microco_in_interrupt(void);
//! ```
//!
//! Handles are registry indices; `-1` means "none" or a failed `co_init`.
//!
//! Author: Moroya Sakamoto

use core::cell::Cell;
use core::slice;

use crate::coroutine::{fatal, Misuse};
use crate::port::Port;
use crate::scheduler::{Scheduler, MAX_COROUTINES};

/// Entry procedure as seen from C
pub type CEntryFn = extern "C" fn();

unsafe extern "C" {
    fn microco_now_ms() -> u32;
    fn microco_in_interrupt() -> bool;
}

/// Port backed by the firmware's `microco_*` symbols
pub struct ExternPort;

impl Port for ExternPort {
    fn now_ms() -> u32 {
        // SAFETY: plain C function without preconditions
        unsafe { microco_now_ms() }
    }

    fn in_interrupt() -> bool {
        // SAFETY: plain C function without preconditions
        unsafe { microco_in_interrupt() }
    }
}

static SCHEDULER: Scheduler<ExternPort> = Scheduler::new();

/// C entry procedures, indexed like the registry
struct CEntries([Cell<Option<CEntryFn>>; MAX_COROUTINES]);

// SAFETY: written by `co_init` and read by the entry shim, both on the one
// non-interrupt thread of control.
unsafe impl Sync for CEntries {}

static C_ENTRIES: CEntries = CEntries([const { Cell::new(None) }; MAX_COROUTINES]);

/// Rust entry of every C coroutine: look up and call the C procedure.
fn c_entry_shim() {
    let Some(id) = SCHEDULER.current() else {
        return;
    };
    if let Some(entry) = C_ENTRIES.0[id.index()].get() {
        entry();
    }
}

fn handle(id: i32) -> crate::coroutine::CoId {
    match usize::try_from(id).ok().and_then(|index| SCHEDULER.handle(index)) {
        Some(id) => id,
        None => fatal(Misuse::UnknownCoroutine),
    }
}

/// Register a coroutine. Returns its handle, or `-1` if the registry is
/// full, the stack too small, or an argument null.
///
/// # Safety
///
/// `stack` must point to `len` writable bytes that stay valid, and are used
/// by nothing else, for the rest of the program.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn co_init(stack: *mut u8, len: usize, entry: Option<CEntryFn>) -> i32 {
    let Some(entry) = entry else {
        return -1;
    };
    if stack.is_null() {
        return -1;
    }

    // SAFETY: guaranteed by the caller
    let stack: &'static mut [u8] = unsafe { slice::from_raw_parts_mut(stack, len) };
    match SCHEDULER.init(stack, c_entry_shim) {
        Some(id) => {
            C_ENTRIES.0[id.index()].set(Some(entry));
            id.index() as i32
        }
        None => -1,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn co_yield() {
    SCHEDULER.yield_now();
}

#[unsafe(no_mangle)]
pub extern "C" fn co_sleep(duration_ms: u32) {
    SCHEDULER.sleep_ms(duration_ms);
}

/// Interrupt-safe. Halts on an unknown handle.
#[unsafe(no_mangle)]
pub extern "C" fn co_resume(id: i32) {
    SCHEDULER.resume(handle(id));
}

/// One loop pass; returns how many coroutines ran.
#[unsafe(no_mangle)]
pub extern "C" fn co_loop() -> u32 {
    SCHEDULER.run_once() as u32
}

#[unsafe(no_mangle)]
pub extern "C" fn co_current() -> i32 {
    SCHEDULER.current().map_or(-1, |id| id.index() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::SimPort;
    use crate::testing::*;
    use core::ptr;

    #[unsafe(no_mangle)]
    extern "C" fn microco_now_ms() -> u32 {
        SimPort::now_ms()
    }

    #[unsafe(no_mangle)]
    extern "C" fn microco_in_interrupt() -> bool {
        SimPort::in_interrupt()
    }

    extern "C" fn blink() {
        note(co_current() as usize);
        trace("on");
        co_sleep(10);
        trace("off");
    }

    // The C scheduler is a process-wide static, so this is the only test
    // driving it.
    #[test]
    fn test_c_abi_flow() {
        install();
        assert_eq!(unsafe { co_init(ptr::null_mut(), 1024, Some(blink)) }, -1);

        let stack = stack();
        let id = unsafe { co_init(stack.as_mut_ptr(), stack.len(), Some(blink)) };
        assert_eq!(id, 0);
        assert_eq!(co_current(), -1);

        co_resume(id);
        assert_eq!(traced(), ["on"]);
        assert_eq!(notes(), [0]);
        assert_eq!(co_loop(), 0);

        SimPort::set_now(10);
        assert_eq!(co_loop(), 1);
        assert_eq!(traced(), ["on", "off"]);
        assert_eq!(co_current(), -1);
    }
}
