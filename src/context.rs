//! Context switch — the narrow machine-specific interface
//!
//! Two operations: `prepare_stack` builds the first frame on a fresh stack,
//! `switch_to` moves between two saved execution points. Everything above
//! this module is portable control logic.
//!
//! Author: Moroya Sakamoto

use core::mem::size_of;

use crate::arch;

pub(crate) use crate::arch::switch_to;

/// Byte pattern written over the free part of every coroutine stack
pub const STACK_PAINT: u8 = 0xC5;

/// Smallest usable stack: switch frame plus a minimal working area
pub const MIN_STACK: usize = arch::FRAME_WORDS * size_of::<usize>() + 64;

/// Function the entry stub calls the first time a stack is switched into.
///
/// Receives the handoff word given to that first `switch_to`.
pub(crate) type Trampoline = extern "C" fn(*const ()) -> !;

/// Saved execution point: the stack pointer of a suspended context
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedPoint(*mut u8);

impl SavedPoint {
    /// Slot that has never been saved into
    pub const fn null() -> Self {
        Self(core::ptr::null_mut())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn addr(&self) -> usize {
        self.0 as usize
    }
}

/// Build the initial switch frame at the aligned top of `stack`.
///
/// Paints everything below the frame with [`STACK_PAINT`]. Returns `None`
/// if the stack cannot hold the frame plus a minimal working area.
pub(crate) fn prepare_stack(stack: &mut [u8], trampoline: Trampoline) -> Option<SavedPoint> {
    const WORD: usize = size_of::<usize>();

    let base = stack.as_mut_ptr() as usize;
    let top = (base + stack.len()) & !(arch::STACK_ALIGN - 1);
    let frame = arch::initial_frame(trampoline);
    let frame_bytes = frame.len() * WORD;

    if top < base + MIN_STACK {
        return None;
    }
    let sp = top - frame_bytes - base;

    stack[..sp].fill(STACK_PAINT);
    for (i, word) in frame.iter().enumerate() {
        let at = sp + i * WORD;
        stack[at..at + WORD].copy_from_slice(&word.to_ne_bytes());
    }

    Some(SavedPoint(stack[sp..].as_mut_ptr()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr;

    extern "C" fn never_entered(_: *const ()) -> ! {
        unreachable!()
    }

    fn leak_stack(len: usize) -> &'static mut [u8] {
        Box::leak(vec![0u8; len].into_boxed_slice())
    }

    #[test]
    fn test_prepare_aligns_frame() {
        let stack = leak_stack(1024);
        let base = stack.as_ptr() as usize;
        let end = base + stack.len();
        let sp = prepare_stack(stack, never_entered).unwrap();
        let top = sp.addr() + arch::FRAME_WORDS * size_of::<usize>();
        assert_eq!(top % arch::STACK_ALIGN, 0);
        assert!(top <= end && end - top < arch::STACK_ALIGN);
        assert!(sp.addr() > base);
    }

    #[test]
    fn test_prepare_paints_free_area() {
        let stack = leak_stack(512);
        let base = stack.as_ptr();
        let sp = prepare_stack(stack, never_entered).unwrap();
        let free = sp.addr() - base as usize;
        let painted = unsafe { core::slice::from_raw_parts(base, free) };
        assert!(painted.iter().all(|&b| b == STACK_PAINT));
    }

    #[test]
    fn test_prepare_rejects_tiny_stack() {
        let stack = leak_stack(MIN_STACK - 1);
        assert!(prepare_stack(stack, never_entered).is_none());
    }

    #[test]
    fn test_saved_point_null() {
        assert!(SavedPoint::null().is_null());
        assert_eq!(SavedPoint::null().addr(), 0);
    }

    struct PingPong {
        main: SavedPoint,
        co: SavedPoint,
        visits: u32,
    }

    extern "C" fn ping(handoff: *const ()) -> ! {
        let pp = handoff as *mut PingPong;
        loop {
            unsafe {
                (*pp).visits += 1;
                switch_to(ptr::addr_of_mut!((*pp).co), ptr::addr_of!((*pp).main), ptr::null());
            }
        }
    }

    #[test]
    fn test_switch_round_trips() {
        let stack = leak_stack(16 * 1024);
        let pp = Box::leak(Box::new(PingPong {
            main: SavedPoint::null(),
            co: prepare_stack(stack, ping).unwrap(),
            visits: 0,
        }));
        let pp: *mut PingPong = pp;

        for expected in 1..=3 {
            unsafe {
                switch_to(ptr::addr_of_mut!((*pp).main), ptr::addr_of!((*pp).co), pp as *const ());
                assert_eq!((*pp).visits, expected);
            }
        }
    }
}
