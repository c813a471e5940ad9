//! Shared fixtures for the host tests
//!
//! Coroutine entry procedures take no arguments, so the scheduler under
//! test and the event log live in thread locals; every test thread gets its
//! own simulated board.
//!
//! Author: Moroya Sakamoto

use std::cell::{Cell, RefCell};
use std::vec::Vec;

use crate::coroutine::{CoId, Status};
use crate::port::SimPort;
use crate::scheduler::Scheduler;

pub type Sched = Scheduler<SimPort, 8>;

/// Coroutine stack size used by the tests
pub const STACK: usize = 32 * 1024;

std::thread_local! {
    static SCHED: Cell<Option<&'static Sched>> = const { Cell::new(None) };
    static TRACE: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    static NOTES: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Fresh scheduler for this thread, clean log, clock at zero
pub fn install() -> &'static Sched {
    let sched: &'static Sched = Box::leak(Box::new(Scheduler::new()));
    SCHED.with(|s| s.set(Some(sched)));
    TRACE.with(|t| t.borrow_mut().clear());
    NOTES.with(|n| n.borrow_mut().clear());
    SimPort::reset();
    sched
}

pub fn sched() -> &'static Sched {
    SCHED.with(Cell::get).expect("scheduler installed")
}

pub fn stack() -> &'static mut [u8] {
    Box::leak(vec![0u8; STACK].into_boxed_slice())
}

pub fn trace(event: &'static str) {
    TRACE.with(|t| t.borrow_mut().push(event));
}

pub fn traced() -> Vec<&'static str> {
    TRACE.with(|t| t.borrow().clone())
}

pub fn note(value: usize) {
    NOTES.with(|n| n.borrow_mut().push(value));
}

pub fn notes() -> Vec<usize> {
    NOTES.with(|n| n.borrow().clone())
}

pub fn running_now(s: &Sched) -> usize {
    (0..s.len())
        .filter(|&i| s.status(CoId(i)) == Status::Running)
        .count()
}

/// Idle loop: one tick per pass, interrupt-wake everything waiting.
pub fn drive(s: &'static Sched, max_passes: usize) {
    for _ in 0..max_passes {
        if s.all_finished() {
            return;
        }
        SimPort::advance(1);
        for i in 0..s.len() {
            let id = CoId(i);
            if s.status(id) == Status::Waiting {
                SimPort::interrupt(|| s.resume(id));
            }
        }
        s.run_once();
    }
}
