//! Completion — parks a coroutine on an interrupt-driven operation
//!
//! The driver pattern: the coroutine claims the completion, starts the
//! transfer, and waits; the transfer-complete interrupt calls `complete`,
//! which flags the waiter `Ready` for the next loop pass. One operation in
//! flight per completion; a second `begin` reports `Busy`.
//!
//! ```ignore
//! static TX_DONE: Completion = Completion::new();
//!
//! fn send(buf: &[u8]) -> Result<(), Busy> {
//!     TX_DONE.begin(&SCHEDULER)?;
//!     uart_start_tx(buf);
//!     TX_DONE.wait(&SCHEDULER);
//!     Ok(())
//! }
//!
//! fn uart_tx_complete_isr() {
//!     TX_DONE.complete(&SCHEDULER);
//! }
//! ```
//!
//! Author: Moroya Sakamoto

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::coroutine::{fatal, Misuse, Status};
use crate::port::Port;
use crate::scheduler::Scheduler;

const NO_WAITER: usize = usize::MAX;

/// An operation is already in flight on this completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy;

impl fmt::Display for Busy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation already in progress")
    }
}

/// One-shot rendezvous between a coroutine and an interrupt handler
pub struct Completion {
    /// Registry index of the waiting coroutine
    waiter: AtomicUsize,
    done: AtomicBool,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            waiter: AtomicUsize::new(NO_WAITER),
            done: AtomicBool::new(false),
        }
    }

    /// Claim the completion for the running coroutine.
    ///
    /// Call before starting the operation. Halts outside a coroutine or
    /// inside an interrupt handler.
    pub fn begin<P: Port, const N: usize>(&self, scheduler: &Scheduler<P, N>) -> Result<(), Busy> {
        if P::in_interrupt() {
            fatal(Misuse::InInterrupt);
        }
        let Some(id) = scheduler.current() else {
            fatal(Misuse::SuspendFromMain);
        };

        critical_section::with(|_| {
            if self.waiter.load(Ordering::Acquire) != NO_WAITER {
                return Err(Busy);
            }
            self.done.store(false, Ordering::Release);
            self.waiter.store(id.index(), Ordering::Release);
            Ok(())
        })
    }

    /// Park until `complete` is called, then release the completion.
    pub fn wait<P: Port, const N: usize>(&self, scheduler: &Scheduler<P, N>) {
        scheduler.yield_until(|| self.done.load(Ordering::Acquire));
        self.release();
    }

    /// Like `wait`, giving up after `timeout_ms`.
    ///
    /// Returns `false` on timeout. The completion is released either way,
    /// so a late `complete` is ignored.
    pub fn wait_timeout<P: Port, const N: usize>(
        &self,
        scheduler: &Scheduler<P, N>,
        timeout_ms: u32,
    ) -> bool {
        let completed = scheduler.sleep_until(timeout_ms, || self.done.load(Ordering::Acquire));
        self.release();
        completed
    }

    /// Mark the operation finished and wake the waiter.
    ///
    /// Meant for the operation's interrupt handler. A waiter that has not
    /// parked yet sees the flag when it calls `wait`. Without a waiter this
    /// is a no-op.
    pub fn complete<P: Port, const N: usize>(&self, scheduler: &'static Scheduler<P, N>) {
        let waiter = self.waiter.load(Ordering::Acquire);
        if waiter == NO_WAITER {
            return;
        }
        self.done.store(true, Ordering::Release);

        let Some(id) = scheduler.handle(waiter) else {
            return;
        };
        if matches!(scheduler.status(id), Status::Waiting | Status::Sleeping) {
            scheduler.resume(id);
        }
    }

    /// An operation is in flight
    pub fn is_busy(&self) -> bool {
        self.waiter.load(Ordering::Acquire) != NO_WAITER
    }

    fn release(&self) {
        self.done.store(false, Ordering::Release);
        self.waiter.store(NO_WAITER, Ordering::Release);
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::SimPort;
    use crate::testing::*;
    use std::cell::Cell;

    std::thread_local! {
        static LINK: Cell<Option<&'static Completion>> = const { Cell::new(None) };
    }

    fn link() -> &'static Completion {
        LINK.with(Cell::get).expect("completion installed")
    }

    fn install_link() -> &'static Completion {
        let link: &'static Completion = Box::leak(Box::new(Completion::new()));
        LINK.with(|l| l.set(Some(link)));
        link
    }

    fn transfer() {
        link().begin(sched()).unwrap();
        trace("started");
        link().wait(sched());
        trace("done");
    }

    fn fast_transfer() {
        link().begin(sched()).unwrap();
        // the interrupt fires before the coroutine reaches wait
        SimPort::interrupt(|| link().complete(sched()));
        link().wait(sched());
        trace("done");
    }

    fn double_begin() {
        link().begin(sched()).unwrap();
        note(usize::from(link().begin(sched()) == Err(Busy)));
        link().wait(sched());
    }

    fn bounded_transfer() {
        link().begin(sched()).unwrap();
        note(usize::from(link().wait_timeout(sched(), 20)));
    }

    #[test]
    fn test_interrupt_completes_transfer() {
        let s = install();
        let link = install_link();
        let a = s.init(stack(), transfer).unwrap();

        s.resume(a);
        assert_eq!(traced(), ["started"]);
        assert!(link.is_busy());
        assert_eq!(s.status(a), Status::Waiting);

        SimPort::interrupt(|| link.complete(s));
        assert_eq!(s.status(a), Status::Ready);
        assert_eq!(traced(), ["started"]);

        assert_eq!(s.run_once(), 1);
        assert_eq!(traced(), ["started", "done"]);
        assert!(!link.is_busy());
    }

    #[test]
    fn test_completion_before_wait_is_not_lost() {
        let s = install();
        install_link();
        let a = s.init(stack(), fast_transfer).unwrap();

        s.resume(a);
        assert_eq!(traced(), ["done"]);
        assert_eq!(s.status(a), Status::Finished);
        assert_eq!(s.switches(), 1);
    }

    #[test]
    fn test_second_begin_is_busy() {
        let s = install();
        let link = install_link();
        let a = s.init(stack(), double_begin).unwrap();
        s.resume(a);
        assert_eq!(notes(), [1]);

        SimPort::interrupt(|| link.complete(s));
        s.run_once();
        assert!(s.all_finished());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let s = install();
        let link = install_link();
        let a = s.init(stack(), bounded_transfer).unwrap();
        s.resume(a);
        assert_eq!(s.status(a), Status::Sleeping);

        SimPort::set_now(20);
        assert_eq!(s.run_once(), 1);
        assert_eq!(notes(), [0]);
        assert!(!link.is_busy());

        // late interrupt after the waiter gave up
        SimPort::interrupt(|| link.complete(s));
        assert_eq!(s.status(a), Status::Finished);
    }

    #[test]
    fn test_wait_timeout_completes_early() {
        let s = install();
        let link = install_link();
        let a = s.init(stack(), bounded_transfer).unwrap();
        s.resume(a);

        SimPort::set_now(3);
        SimPort::interrupt(|| link.complete(s));
        assert_eq!(s.status(a), Status::Ready);
        assert_eq!(s.run_once(), 1);
        assert_eq!(notes(), [1]);
    }

    #[test]
    fn test_complete_without_waiter_is_noop() {
        let s = install();
        let link = install_link();
        SimPort::interrupt(|| link.complete(s));
        assert!(!link.is_busy());
    }

    #[test]
    #[should_panic(expected = "suspend from the main context")]
    fn test_begin_outside_coroutine_traps() {
        let s = install();
        let _ = install_link().begin(s);
    }

    #[test]
    fn test_busy_display() {
        assert_eq!(Busy.to_string(), "operation already in progress");
    }
}
