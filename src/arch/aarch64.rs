//! AArch64 (AAPCS64) stack switch
//!
//! Callee-saved set: x19-x28, fp, lr and the low halves of v8-v15.
//!
//! Author: Moroya Sakamoto

use core::arch::naked_asm;

use crate::context::{SavedPoint, Trampoline};

pub(crate) const STACK_ALIGN: usize = 16;

/// x19-x28, fp, lr, d8-d15
pub(crate) const FRAME_WORDS: usize = 20;

/// Fresh frame: trampoline parked in x19, lr points at the entry stub.
pub(crate) fn initial_frame(trampoline: Trampoline) -> [usize; FRAME_WORDS] {
    let mut frame = [0usize; FRAME_WORDS];
    frame[0] = trampoline as usize; // x19
    frame[11] = entry_stub as *const () as usize; // lr
    frame
}

#[unsafe(naked)]
unsafe extern "C" fn entry_stub() -> ! {
    naked_asm!(
        "mov x0, x2",
        "blr x19",
        "brk #0x1",
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
    // Arguments: x0 = save, x1 = load, x2 = handoff
    naked_asm!(
        "sub sp, sp, #160",
        "stp x19, x20, [sp, #0x00]",
        "stp x21, x22, [sp, #0x10]",
        "stp x23, x24, [sp, #0x20]",
        "stp x25, x26, [sp, #0x30]",
        "stp x27, x28, [sp, #0x40]",
        "stp x29, x30, [sp, #0x50]",
        "stp d8,  d9,  [sp, #0x60]",
        "stp d10, d11, [sp, #0x70]",
        "stp d12, d13, [sp, #0x80]",
        "stp d14, d15, [sp, #0x90]",
        "mov x9, sp",
        "str x9, [x0]",
        "ldr x9, [x1]",
        "mov sp, x9",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp x29, x30, [sp, #0x50]",
        "ldp d8,  d9,  [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #160",
        "ret",
    );
}
