//! Cooperative scheduler
//!
//! Owns the registry of coroutine control blocks, the main-context pseudo
//! CCB and the `current` pointer. Coroutines give control back with
//! `yield_now`/`sleep_ms`; the application idle loop calls `run_once`;
//! interrupt handlers call `resume`, which only flags the coroutine `Ready`
//! and leaves the stack switch to the next loop pass.
//!
//! Static registry, no dynamic allocation.
//!
//! Author: Moroya Sakamoto

use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::context;
use crate::coroutine::{fatal, Ccb, CoId, EntryFn, Event, Misuse, Status};
use crate::port::Port;
use crate::timer::{self, NOT_SLEEPING};

/// Default registry capacity
pub const MAX_COROUTINES: usize = 8;

/// Cooperative coroutine scheduler
///
/// Meant to live in a `static`: `resume` and `run_once` take
/// `&'static self` because a running coroutine keeps a reference to the
/// scheduler on its own stack.
pub struct Scheduler<P: Port, const N: usize = MAX_COROUTINES> {
    /// Pseudo CCB of the non-coroutine context; status is always `Main`
    main: Ccb,
    /// Registry, in registration order
    slots: [Ccb; N],
    /// Registered slots; read by interrupt handlers
    count: AtomicUsize,
    /// Running coroutine, `None` in the main context
    current: Cell<Option<CoId>>,
    /// Total main -> coroutine switches
    switches: Cell<u32>,
    _port: PhantomData<fn() -> P>,
}

// SAFETY: single core. Interrupt handlers read `count` and a status byte and
// store a status byte, all atomics. Every other field is only touched by the
// one non-interrupt thread of control the coroutines share cooperatively.
unsafe impl<P: Port, const N: usize> Sync for Scheduler<P, N> {}

impl<P: Port, const N: usize> Scheduler<P, N> {
    /// Empty scheduler
    pub const fn new() -> Self {
        Self {
            main: Ccb::main(),
            slots: [const { Ccb::empty() }; N],
            count: AtomicUsize::new(0),
            current: Cell::new(None),
            switches: Cell::new(0),
            _port: PhantomData,
        }
    }

    /// Register a coroutine running `entry` on `stack`.
    ///
    /// The coroutine starts `Idle` and runs on its first `resume`. Returns
    /// `None` if the registry is full or the stack cannot hold the initial
    /// frame. Stack depth of `entry` is the caller's responsibility.
    pub fn init(&self, stack: &'static mut [u8], entry: EntryFn) -> Option<CoId> {
        if P::in_interrupt() {
            fatal(Misuse::InInterrupt);
        }

        let index = self.count.load(Ordering::Acquire);
        if index >= N {
            log::warn!("coroutine registry full ({} slots)", N);
            return None;
        }

        let Some(saved) = context::prepare_stack(stack, coroutine_entry::<P, N>) else {
            log::warn!("{} byte stack too small for a coroutine", stack.len());
            return None;
        };

        self.slots[index].bind(stack, saved, entry);
        self.count.store(index + 1, Ordering::Release);

        let id = CoId(index);
        log::debug!("{} registered, {} byte stack", id, stack.len());
        Some(id)
    }

    /// Start or continue a coroutine.
    ///
    /// From the main context this switches into the coroutine and returns
    /// once it yields, sleeps or finishes. From an interrupt handler, or
    /// from inside another coroutine, it only marks the target `Ready`; the
    /// next `run_once` activates it.
    ///
    /// Halts if the target is `Running` or `Finished`.
    pub fn resume(&'static self, id: CoId) {
        let ccb = self.ccb(id);

        if P::in_interrupt() || self.current.get().is_some() {
            ccb.transition(Event::Wake);
            return;
        }

        ccb.transition(Event::Resume);
        ccb.wake_at.set(NOT_SLEEPING);
        self.current.set(Some(id));
        self.switches.set(self.switches.get().wrapping_add(1));
        log::trace!("main -> {}", id);

        // SAFETY: both slots belong to this scheduler, the target holds a
        // point saved by its last suspend or by `prepare_stack`, and the
        // handoff is this 'static scheduler, which `coroutine_entry` expects.
        unsafe {
            context::switch_to(
                self.main.saved.as_ptr(),
                ccb.saved.as_ptr(),
                self as *const Self as *const (),
            );
        }

        self.current.set(None);
        log::trace!("{} -> main ({:?})", id, ccb.status());
    }

    /// Give control back to the main context until resumed.
    ///
    /// Halts unless called by the running coroutine.
    pub fn yield_now(&self) {
        let id = self.running();
        self.slots[id.0].transition(Event::Yield);
        self.suspend(id);
    }

    /// Suspend the running coroutine for at least `duration_ms` ticks.
    ///
    /// `sleep_ms(0)` still suspends until the next loop pass. Durations
    /// above [`MAX_SLEEP_MS`](crate::timer::MAX_SLEEP_MS) (about 24.8 days)
    /// are clamped to it.
    pub fn sleep_ms(&self, duration_ms: u32) {
        let id = self.running();
        let ccb = &self.slots[id.0];
        ccb.transition(Event::Sleep);
        ccb.wake_at.set(timer::wake_tick(P::now_ms(), duration_ms));
        self.suspend(id);
    }

    /// Yield until `ready` returns true.
    ///
    /// `ready` is evaluated and the coroutine parked inside one critical
    /// section, so an interrupt that makes `ready` true and then resumes
    /// the coroutine cannot slip in between the check and the park.
    pub fn yield_until(&self, mut ready: impl FnMut() -> bool) {
        let id = self.running();
        let ccb = &self.slots[id.0];

        loop {
            let park = critical_section::with(|_| {
                if ready() {
                    false
                } else {
                    ccb.transition(Event::Yield);
                    true
                }
            });
            if !park {
                return;
            }
            self.suspend(id);
        }
    }

    /// Sleep until `ready` returns true or `timeout_ms` elapses.
    ///
    /// Returns `true` if `ready` held, `false` on timeout. `timeout_ms` is
    /// clamped like the duration of [`sleep_ms`](Self::sleep_ms). Parking is
    /// atomic with the check, as in [`yield_until`](Self::yield_until); an
    /// interrupt resume cuts the sleep short so `ready` is re-evaluated.
    pub fn sleep_until(&self, timeout_ms: u32, mut ready: impl FnMut() -> bool) -> bool {
        let id = self.running();
        let ccb = &self.slots[id.0];
        let deadline = timer::wake_tick(P::now_ms(), timeout_ms);

        loop {
            let outcome = critical_section::with(|_| {
                if ready() {
                    return Some(true);
                }
                if timer::deadline_reached(P::now_ms(), deadline) {
                    return Some(false);
                }
                ccb.transition(Event::Sleep);
                ccb.wake_at.set(deadline);
                None
            });
            match outcome {
                Some(ready) => return ready,
                None => self.suspend(id),
            }
        }
    }

    /// One scheduling pass over the registry, in registration order.
    ///
    /// Resumes every coroutine that is `Ready` or whose sleep has elapsed.
    /// Returns how many were resumed. Call repeatedly from the idle loop.
    pub fn run_once(&'static self) -> usize {
        if P::in_interrupt() {
            fatal(Misuse::InInterrupt);
        }
        if self.current.get().is_some() {
            fatal(Misuse::LoopFromCoroutine);
        }

        let mut resumed = 0;
        for index in 0..self.len() {
            let ccb = &self.slots[index];
            let due = match ccb.status() {
                Status::Ready => true,
                Status::Sleeping => timer::deadline_reached(P::now_ms(), ccb.wake_at.get()),
                _ => false,
            };
            if due {
                self.resume(CoId(index));
                resumed += 1;
            }
        }
        resumed
    }

    /// Running coroutine, `None` in the main context
    pub fn current(&self) -> Option<CoId> {
        self.current.get()
    }

    /// Status of a registered coroutine
    pub fn status(&self, id: CoId) -> Status {
        self.ccb(id).status()
    }

    /// Wake tick of a sleeping coroutine
    pub fn wake_at(&self, id: CoId) -> Option<u32> {
        self.ccb(id).wake_at()
    }

    /// Handle for the `index`-th registered coroutine
    pub fn handle(&self, index: usize) -> Option<CoId> {
        if index < self.len() {
            Some(CoId(index))
        } else {
            None
        }
    }

    /// Number of registered coroutines
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registry capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Every registered coroutine has returned
    pub fn all_finished(&self) -> bool {
        self.slots[..self.len()]
            .iter()
            .all(|ccb| ccb.status() == Status::Finished)
    }

    /// Total context switches into coroutines
    pub fn switches(&self) -> u32 {
        self.switches.get()
    }

    /// Untouched bytes at the bottom of a coroutine's stack
    pub fn stack_headroom(&self, id: CoId) -> usize {
        self.ccb(id).stack_headroom()
    }

    fn ccb(&self, id: CoId) -> &Ccb {
        if id.0 >= self.len() {
            fatal(Misuse::UnknownCoroutine);
        }
        &self.slots[id.0]
    }

    /// The calling coroutine, halting if there is none
    fn running(&self) -> CoId {
        if P::in_interrupt() {
            fatal(Misuse::InInterrupt);
        }
        match self.current.get() {
            Some(id) => id,
            None => fatal(Misuse::SuspendFromMain),
        }
    }

    /// Switch from coroutine `id` back into the main context.
    fn suspend(&self, id: CoId) {
        // SAFETY: `id` is the running coroutine, so its slot may be
        // overwritten; main is suspended inside `resume`.
        unsafe {
            context::switch_to(
                self.slots[id.0].saved.as_ptr(),
                self.main.saved.as_ptr(),
                ptr::null(),
            );
        }
    }

    /// Body of every coroutine, on its own stack
    fn run_current(&self) -> ! {
        let id = self.running();
        let ccb = &self.slots[id.0];

        if let Some(entry) = ccb.entry.get() {
            entry();
        }

        ccb.transition(Event::Return);
        log::trace!("{} finished", id);
        self.suspend(id);

        fatal(Misuse::ResumeFinished)
    }
}

impl<P: Port, const N: usize> Default for Scheduler<P, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// First code a coroutine stack runs
extern "C" fn coroutine_entry<P: Port, const N: usize>(handoff: *const ()) -> ! {
    // SAFETY: the first switch into a stack always comes from `resume`,
    // which hands over its own &'static scheduler.
    let scheduler = unsafe { &*(handoff as *const Scheduler<P, N>) };
    scheduler.run_current()
}
