//! Coroutine control block — status machine and per-coroutine record
//!
//! Each CCB owns a saved execution point into its own caller-supplied
//! stack. Status changes go through [`Status::on`], which halts on any
//! transition the state table does not allow.
//!
//! Author: Moroya Sakamoto

use core::cell::Cell;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::context::{SavedPoint, STACK_PAINT};
use crate::timer::NOT_SLEEPING;

/// Coroutine entry procedure — runs once, to completion
pub type EntryFn = fn();

/// Handle to a registered coroutine (registry index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoId(pub(crate) usize);

impl CoId {
    /// Registry index, equal to registration order
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "co#{}", self.0)
    }
}

/// Coroutine status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Initialized, never run
    Idle = 0,
    /// The main (non-coroutine) context; never transitions
    Main = 1,
    /// Woken by an interrupt, runs on the next loop pass
    Ready = 2,
    /// Currently executing
    Running = 3,
    /// Yielded, waits for an explicit resume
    Waiting = 4,
    /// Yielded until its wake tick
    Sleeping = 5,
    /// Entry procedure returned; terminal
    Finished = 6,
}

impl Status {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Status::Idle,
            1 => Status::Main,
            2 => Status::Ready,
            3 => Status::Running,
            4 => Status::Waiting,
            5 => Status::Sleeping,
            _ => Status::Finished,
        }
    }

    /// Apply `event`, halting on a transition the state table forbids.
    pub fn on(self, event: Event) -> Status {
        use Status::*;
        match (self, event) {
            (Idle | Waiting | Sleeping | Ready, Event::Resume) => Running,
            (Idle | Waiting | Sleeping | Ready, Event::Wake) => Ready,
            (Running, Event::Yield) => Waiting,
            (Running, Event::Sleep) => Sleeping,
            (Running, Event::Return) => Finished,
            (Running, Event::Resume | Event::Wake) => fatal(Misuse::ResumeRunning),
            (Finished, Event::Resume | Event::Wake) => fatal(Misuse::ResumeFinished),
            (Main, Event::Resume | Event::Wake) => fatal(Misuse::ResumeMain),
            (_, Event::Yield | Event::Sleep | Event::Return) => fatal(Misuse::SuspendNotRunning),
        }
    }
}

/// What drives a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Immediate activation from the main context
    Resume,
    /// Deferred activation (interrupt handler or another coroutine)
    Wake,
    Yield,
    Sleep,
    /// Entry procedure returned
    Return,
}

/// Contract violations; every one of them halts execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Misuse {
    ResumeRunning,
    ResumeFinished,
    ResumeMain,
    /// yield/sleep by a coroutine that is not `Running`
    SuspendNotRunning,
    /// yield/sleep outside any coroutine
    SuspendFromMain,
    /// yield/sleep/loop/init inside an interrupt handler
    InInterrupt,
    /// loop pass started from inside a coroutine
    LoopFromCoroutine,
    /// handle not issued by this scheduler
    UnknownCoroutine,
}

impl fmt::Display for Misuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Misuse::ResumeRunning => write!(f, "resume of a running coroutine"),
            Misuse::ResumeFinished => write!(f, "resume of a finished coroutine"),
            Misuse::ResumeMain => write!(f, "resume of the main context"),
            Misuse::SuspendNotRunning => write!(f, "suspend while not running"),
            Misuse::SuspendFromMain => write!(f, "suspend from the main context"),
            Misuse::InInterrupt => write!(f, "scheduler call not allowed in an interrupt handler"),
            Misuse::LoopFromCoroutine => write!(f, "loop pass from inside a coroutine"),
            Misuse::UnknownCoroutine => write!(f, "unknown coroutine handle"),
        }
    }
}

/// Halt on a contract violation instead of running on with corrupt state.
#[cold]
#[track_caller]
pub fn fatal(misuse: Misuse) -> ! {
    log::error!("coroutine misuse: {}", misuse);

    #[cfg(all(feature = "cortex-m", target_arch = "arm"))]
    cortex_m::asm::udf();

    #[cfg(not(all(feature = "cortex-m", target_arch = "arm")))]
    panic!("coroutine misuse: {}", misuse);
}

/// Coroutine control block
pub(crate) struct Ccb {
    /// Stack pointer of the suspended context
    pub(crate) saved: Cell<SavedPoint>,
    pub(crate) entry: Cell<Option<EntryFn>>,
    /// Written by interrupt handlers, hence atomic
    status: AtomicU8,
    /// Absolute wake tick, `NOT_SLEEPING` otherwise
    pub(crate) wake_at: Cell<u32>,
    stack_base: Cell<*const u8>,
    stack_len: Cell<usize>,
}

impl Ccb {
    /// Unregistered slot
    pub(crate) const fn empty() -> Self {
        Self::with_status(Status::Idle)
    }

    /// The main-context pseudo CCB
    pub(crate) const fn main() -> Self {
        Self::with_status(Status::Main)
    }

    const fn with_status(status: Status) -> Self {
        Self {
            saved: Cell::new(SavedPoint::null()),
            entry: Cell::new(None),
            status: AtomicU8::new(status as u8),
            wake_at: Cell::new(NOT_SLEEPING),
            stack_base: Cell::new(core::ptr::null()),
            stack_len: Cell::new(0),
        }
    }

    pub(crate) fn bind(&self, stack: &[u8], saved: SavedPoint, entry: EntryFn) {
        self.stack_base.set(stack.as_ptr());
        self.stack_len.set(stack.len());
        self.saved.set(saved);
        self.entry.set(Some(entry));
        self.wake_at.set(NOT_SLEEPING);
        self.set_status(Status::Idle);
    }

    pub(crate) fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Apply `event` to the current status and store the result.
    pub(crate) fn transition(&self, event: Event) -> Status {
        let next = self.status().on(event);
        self.set_status(next);
        next
    }

    /// Absolute wake tick, `None` when not sleeping
    pub(crate) fn wake_at(&self) -> Option<u32> {
        match self.wake_at.get() {
            NOT_SLEEPING => None,
            tick => Some(tick),
        }
    }

    /// Bytes at the bottom of the stack still holding the paint pattern
    pub(crate) fn stack_headroom(&self) -> usize {
        let base = self.stack_base.get();
        if base.is_null() {
            return 0;
        }
        // SAFETY: the buffer is 'static and bound to this CCB only; reading
        // a byte races with nothing on a single core.
        (0..self.stack_len.get())
            .take_while(|&i| unsafe { base.add(i).read_volatile() } == STACK_PAINT)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_resume() {
        assert_eq!(Status::Idle.on(Event::Resume), Status::Running);
        assert_eq!(Status::Idle.on(Event::Wake), Status::Ready);
    }

    #[test]
    fn test_running_suspends() {
        assert_eq!(Status::Running.on(Event::Yield), Status::Waiting);
        assert_eq!(Status::Running.on(Event::Sleep), Status::Sleeping);
        assert_eq!(Status::Running.on(Event::Return), Status::Finished);
    }

    #[test]
    fn test_parked_resume_and_wake() {
        for parked in [Status::Waiting, Status::Sleeping, Status::Ready] {
            assert_eq!(parked.on(Event::Resume), Status::Running);
            assert_eq!(parked.on(Event::Wake), Status::Ready);
        }
    }

    #[test]
    #[should_panic(expected = "resume of a running coroutine")]
    fn test_resume_running_traps() {
        Status::Running.on(Event::Resume);
    }

    #[test]
    #[should_panic(expected = "resume of a running coroutine")]
    fn test_wake_running_traps() {
        Status::Running.on(Event::Wake);
    }

    #[test]
    #[should_panic(expected = "resume of a finished coroutine")]
    fn test_resume_finished_traps() {
        Status::Finished.on(Event::Resume);
    }

    #[test]
    #[should_panic(expected = "resume of a finished coroutine")]
    fn test_wake_finished_traps() {
        Status::Finished.on(Event::Wake);
    }

    #[test]
    #[should_panic(expected = "resume of the main context")]
    fn test_resume_main_traps() {
        Status::Main.on(Event::Resume);
    }

    #[test]
    #[should_panic(expected = "suspend while not running")]
    fn test_yield_while_waiting_traps() {
        Status::Waiting.on(Event::Yield);
    }

    #[test]
    #[should_panic(expected = "suspend while not running")]
    fn test_main_never_yields() {
        Status::Main.on(Event::Sleep);
    }

    #[test]
    fn test_status_round_trips_through_cell() {
        let ccb = Ccb::empty();
        for status in [
            Status::Idle,
            Status::Ready,
            Status::Running,
            Status::Waiting,
            Status::Sleeping,
            Status::Finished,
        ] {
            ccb.set_status(status);
            assert_eq!(ccb.status(), status);
        }
    }

    #[test]
    fn test_main_ccb() {
        let main = Ccb::main();
        assert_eq!(main.status(), Status::Main);
        assert_eq!(main.stack_headroom(), 0);
    }

    #[test]
    fn test_wake_at_sentinel() {
        let ccb = Ccb::empty();
        assert_eq!(ccb.wake_at(), None);
        ccb.wake_at.set(42);
        assert_eq!(ccb.wake_at(), Some(42));
    }

    #[test]
    fn test_misuse_display() {
        let mut buf = String::new();
        use core::fmt::Write;
        write!(buf, "{}", Misuse::UnknownCoroutine).unwrap();
        assert_eq!(buf, "unknown coroutine handle");
        assert_eq!(CoId(3).to_string(), "co#3");
    }
}
