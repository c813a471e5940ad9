//! Architecture ports of the stack switch
//!
//! Every port provides the same four items:
//! - `STACK_ALIGN`: alignment of the initial stack top
//! - `FRAME_WORDS`: size of the frame `switch_to` keeps on a suspended stack
//! - `initial_frame`: the frame a fresh coroutine stack starts with, lowest
//!   address first, so the first switch lands in the trampoline
//! - `switch_to`: the naked save/restore routine
//!
//! The frame holds the callee-saved registers and the return point. The
//! entry stub of each port reads the trampoline address from a callee-saved
//! register slot and the handoff word from the third argument register of
//! `switch_to`, which the switch itself never touches.
//!
//! Author: Moroya Sakamoto

#[cfg(target_arch = "arm")]
mod arm;
#[cfg(target_arch = "arm")]
pub(crate) use arm::{initial_frame, switch_to, FRAME_WORDS, STACK_ALIGN};

#[cfg(target_arch = "riscv32")]
mod riscv32;
#[cfg(target_arch = "riscv32")]
pub(crate) use riscv32::{initial_frame, switch_to, FRAME_WORDS, STACK_ALIGN};

#[cfg(all(target_arch = "x86_64", not(windows)))]
mod x86_64;
#[cfg(all(target_arch = "x86_64", not(windows)))]
pub(crate) use x86_64::{initial_frame, switch_to, FRAME_WORDS, STACK_ALIGN};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub(crate) use aarch64::{initial_frame, switch_to, FRAME_WORDS, STACK_ALIGN};

#[cfg(not(any(
    target_arch = "arm",
    target_arch = "riscv32",
    all(target_arch = "x86_64", not(windows)),
    target_arch = "aarch64",
)))]
compile_error!("microco supports ARM Thumb, RISC-V 32, x86-64 (System V) and AArch64 only");
