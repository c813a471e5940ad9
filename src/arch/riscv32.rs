//! RISC-V 32 stack switch (RV32I/RV32IMC, integer registers only)
//!
//! Coroutines on cores with the F extension must not keep live values in
//! fs0-fs11 across a yield.
//!
//! Author: Moroya Sakamoto

use core::arch::naked_asm;

use crate::context::{SavedPoint, Trampoline};

pub(crate) const STACK_ALIGN: usize = 16;

/// ra, s0-s11, padded to 16 bytes
pub(crate) const FRAME_WORDS: usize = 16;

/// Fresh frame: ra points at the entry stub, trampoline parked in s1.
pub(crate) fn initial_frame(trampoline: Trampoline) -> [usize; FRAME_WORDS] {
    let mut frame = [0usize; FRAME_WORDS];
    frame[0] = entry_stub as *const () as usize; // ra
    frame[2] = trampoline as usize; // s1
    frame
}

#[unsafe(naked)]
unsafe extern "C" fn entry_stub() -> ! {
    naked_asm!(
        "mv a0, a2",
        "jalr s1",
        "unimp",
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
    // Arguments: a0 = save, a1 = load, a2 = handoff
    naked_asm!(
        "addi sp, sp, -64",
        "sw ra,  0(sp)",
        "sw s0,  4(sp)",
        "sw s1,  8(sp)",
        "sw s2,  12(sp)",
        "sw s3,  16(sp)",
        "sw s4,  20(sp)",
        "sw s5,  24(sp)",
        "sw s6,  28(sp)",
        "sw s7,  32(sp)",
        "sw s8,  36(sp)",
        "sw s9,  40(sp)",
        "sw s10, 44(sp)",
        "sw s11, 48(sp)",
        "sw sp, 0(a0)",
        "lw sp, 0(a1)",
        "lw ra,  0(sp)",
        "lw s0,  4(sp)",
        "lw s1,  8(sp)",
        "lw s2,  12(sp)",
        "lw s3,  16(sp)",
        "lw s4,  20(sp)",
        "lw s5,  24(sp)",
        "lw s6,  28(sp)",
        "lw s7,  32(sp)",
        "lw s8,  36(sp)",
        "lw s9,  40(sp)",
        "lw s10, 44(sp)",
        "lw s11, 48(sp)",
        "addi sp, sp, 64",
        "ret",
    );
}
