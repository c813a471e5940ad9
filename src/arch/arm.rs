//! ARM Thumb stack switch (Cortex-M0/M0+/M3/M4/M7/M33)
//!
//! Sticks to Thumb-1 encodings so the same routine serves ARMv6-M. On
//! hard-float targets the FPU callee-saved bank d8-d15 is saved as well.
//!
//! Frame layout, lowest address first:
//! `[d8-d15]? r8 r9 r10 r11 r4 r5 r6 r7 pc pad pad`
//!
//! Author: Moroya Sakamoto

use core::arch::naked_asm;

use crate::context::{SavedPoint, Trampoline};

/// AAPCS requires 8-byte stack alignment at public interfaces.
pub(crate) const STACK_ALIGN: usize = 8;

#[cfg(target_abi = "eabihf")]
const FP_WORDS: usize = 16;
#[cfg(not(target_abi = "eabihf"))]
const FP_WORDS: usize = 0;

/// r4-r11, pc, two pad words so the stub starts on an 8-byte aligned stack
pub(crate) const FRAME_WORDS: usize = FP_WORDS + 11;

/// Fresh frame: trampoline parked in r4, pc points at the entry stub.
///
/// Function addresses already carry the Thumb bit, which `pop {pc}` needs.
pub(crate) fn initial_frame(trampoline: Trampoline) -> [usize; FRAME_WORDS] {
    let mut frame = [0usize; FRAME_WORDS];
    frame[FP_WORDS + 4] = trampoline as usize; // r4
    frame[FP_WORDS + 8] = entry_stub as *const () as usize; // pc
    frame
}

#[unsafe(naked)]
unsafe extern "C" fn entry_stub() -> ! {
    naked_asm!(
        "mov r0, r2",
        "blx r4",
        "udf #0",
    );
}

/// Save the callee-saved registers on the current stack, store the stack
/// pointer into `save`, then restore from the stack found in `load`.
///
/// # Safety
/// `save` must be writable, `load` must hold a point produced by a previous
/// switch or by `prepare_stack`, and the stack it names must still be alive.
#[cfg(not(target_abi = "eabihf"))]
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch_to(
    _save: *mut SavedPoint,
    _load: *const SavedPoint,
    _handoff: *const (),
) {
    // Arguments: r0 = save, r1 = load, r2 = handoff
    naked_asm!(
        "push {{r4-r7, lr}}",
        "mov r4, r8",
        "mov r5, r9",
        "mov r6, r10",
        "mov r7, r11",
        "push {{r4-r7}}",
        "mov r3, sp",
        "str r3, [r0]",
        "ldr r3, [r1]",
        "mov sp, r3",
        "pop {{r4-r7}}",
        "mov r8, r4",
        "mov r9, r5",
        "mov r10, r6",
        "mov r11, r7",
        "pop {{r4-r7, pc}}",
    );
}

/// Save the callee-saved registers on the current stack, store the stack
/// pointer into `save`, then restore from the stack found in `load`.
///
/// # Safety
/// `save` must be writable, `load` must hold a point produced by a previous
/// switch or by `prepare_stack`, and the stack it names must still be alive.
#[cfg(target_abi = "eabihf")]
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch_to(
    _save: *mut SavedPoint,
    _load: *const SavedPoint,
    _handoff: *const (),
) {
    naked_asm!(
        "push {{r4-r7, lr}}",
        "mov r4, r8",
        "mov r5, r9",
        "mov r6, r10",
        "mov r7, r11",
        "push {{r4-r7}}",
        "vpush {{d8-d15}}",
        "mov r3, sp",
        "str r3, [r0]",
        "ldr r3, [r1]",
        "mov sp, r3",
        "vpop {{d8-d15}}",
        "pop {{r4-r7}}",
        "mov r8, r4",
        "mov r9, r5",
        "mov r10, r6",
        "mov r11, r7",
        "pop {{r4-r7, pc}}",
    );
}
