//! x86-64 (System V) stack switch
//!
//! Used for host-side simulation and tests.
//!
//! Author: Moroya Sakamoto

use core::arch::naked_asm;

use crate::context::{SavedPoint, Trampoline};

/// System V requires a 16-byte aligned stack at every call boundary.
pub(crate) const STACK_ALIGN: usize = 16;

/// r15, r14, r13, r12, rbx, rbp, return address
pub(crate) const FRAME_WORDS: usize = 7;

/// Fresh frame: trampoline parked in r12, `ret` goes to the entry stub.
///
/// After the six pops and the `ret` the stack pointer sits exactly on the
/// aligned top, so the stub's `call` enters the trampoline with the usual
/// `16n + 8` alignment.
pub(crate) fn initial_frame(trampoline: Trampoline) -> [usize; FRAME_WORDS] {
    let mut frame = [0usize; FRAME_WORDS];
    frame[3] = trampoline as usize; // r12
    frame[6] = entry_stub as *const () as usize; // return address
    frame
}

#[unsafe(naked)]
unsafe extern "C" fn entry_stub() -> ! {
    naked_asm!(
        // handoff (third argument of switch_to) becomes the first argument
        "mov rdi, rdx",
        "call r12",
        "ud2",
    );
}

/// Save the callee-saved registers on the current stack, store the stack
/// pointer into `save`, then restore from the stack found in `load`.
///
/// # Safety
/// `save` must be writable, `load` must hold a point produced by a previous
/// switch or by `prepare_stack`, and the stack it names must still be alive.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch_to(
    _save: *mut SavedPoint,
    _load: *const SavedPoint,
    _handoff: *const (),
) {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, [rsi]",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        // Fresh stack: jumps to entry_stub. Suspended stack: returns from
        // its own call to switch_to.
        "ret",
    );
}
