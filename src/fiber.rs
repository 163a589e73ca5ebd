//! The fiber control block and the builder/join-handle API used to spawn
//! fibers, mirroring the shape of a thread-spawning API (`Builder`,
//! `JoinHandle<T>`) but scheduled cooperatively on one OS thread.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::scheduler;
use crate::stack::Stack;
use std::cell::{Cell, RefCell, UnsafeCell};
use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Instant;

/// The number of tickets a fiber is weighted C by to get its stride:
/// `stride = STRIDE_CONSTANT / tickets`. Matches the conventional stride
/// scheduling constant so that a single-ticket fiber's stride stays well
/// clear of `u64` overflow even after millions of passes.
pub const STRIDE_CONSTANT: u64 = 10_000;

/// Default ticket count assigned to a fiber that doesn't ask for more.
pub const DEFAULT_TICKETS: u32 = 100;

/// Identifies a fiber for the lifetime of the process. Ids are never
/// reused even after the fiber that held them terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(pub(crate) u64);

impl std::fmt::Display for FiberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a fiber sits in its lifecycle. A fiber occupies exactly one of
/// these states at any point the scheduler observes it, and is a member
/// of exactly one wait structure (the ready heap, the sleep list, the I/O
/// wait set, or a sync primitive's wait queue) while `Blocked`, and none
/// while `Running` or `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    New,
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// Why a `Blocked` fiber is blocked, so the scheduler's deadlock detector
/// can report a useful breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedOn {
    Sleep,
    Io,
    Mutex,
    Condvar,
    Join,
}

/// The fiber control block. Never exposed by value; always handled through
/// `Rc<Tcb>` so it can be a member of the global fiber table and of at
/// most one wait queue at a time simultaneously.
pub(crate) struct Tcb {
    pub id: FiberId,
    // `UnsafeCell`, not `RefCell`: a fiber's own stack frame holds a
    // notional "borrow" of its context for as long as it's suspended
    // mid-switch, which would make `RefCell` panic the moment the
    // scheduler tries to switch back into it. Exclusive access is instead
    // guaranteed by the scheduler's invariant that a context is only ever
    // touched by the single switch that's currently resuming or
    // suspending it.
    pub context: UnsafeCell<Context>,
    // Kept alive for the fiber's whole lifetime; held in an Option so the
    // scheduler can take it out and drop it (unmapping the stack) on the
    // step *after* the fiber that owned it terminates, once nothing is
    // executing on it anymore.
    pub stack: RefCell<Option<Stack>>,
    pub state: Cell<FiberState>,
    pub blocked_on: Cell<Option<BlockedOn>>,
    pub tickets: Cell<u32>,
    pub stride: Cell<u64>,
    pub pass: Cell<u64>,
    pub wake_at: Cell<Option<Instant>>,
    pub waiting_fd: Cell<Option<RawFd>>,
    pub join_waiters: RefCell<VecDeque<Rc<Tcb>>>,
    pub name: Option<String>,
}

impl Tcb {
    pub fn new(id: FiberId, context: Context, stack: Stack, tickets: u32, name: Option<String>) -> Rc<Self> {
        let stride = STRIDE_CONSTANT / tickets.max(1) as u64;
        Rc::new(Self {
            id,
            context: UnsafeCell::new(context),
            stack: RefCell::new(Some(stack)),
            state: Cell::new(FiberState::New),
            blocked_on: Cell::new(None),
            tickets: Cell::new(tickets),
            stride: Cell::new(stride),
            pass: Cell::new(0),
            wake_at: Cell::new(None),
            waiting_fd: Cell::new(None),
            join_waiters: RefCell::new(VecDeque::new()),
            name,
        })
    }

    pub fn set_tickets(&self, tickets: u32) {
        self.tickets.set(tickets.max(1));
        self.stride.set(STRIDE_CONSTANT / tickets.max(1) as u64);
    }
}

/// A snapshot of a fiber's scheduling state, the primitive an external
/// dashboard/metrics exporter would poll via [`crate::metrics::for_each_fiber`].
#[derive(Debug, Clone)]
pub struct FiberSnapshot {
    pub id: FiberId,
    pub name: Option<String>,
    pub state: FiberState,
    pub tickets: u32,
    pub stride: u64,
    pub pass: u64,
    pub waiting_fd: Option<RawFd>,
    pub wake_at: Option<Instant>,
}

impl From<&Rc<Tcb>> for FiberSnapshot {
    fn from(tcb: &Rc<Tcb>) -> Self {
        Self {
            id: tcb.id,
            name: tcb.name.clone(),
            state: tcb.state.get(),
            tickets: tcb.tickets.get(),
            stride: tcb.stride.get(),
            pass: tcb.pass.get(),
            waiting_fd: tcb.waiting_fd.get(),
            wake_at: tcb.wake_at.get(),
        }
    }
}

/// Builds a fiber before spawning it, the way `std::thread::Builder` does
/// for OS threads.
pub struct Builder {
    tickets: u32,
    stack_size: usize,
    name: Option<String>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            tickets: DEFAULT_TICKETS,
            stack_size: crate::stack::DEFAULT_STACK_SIZE,
            name: None,
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fiber's ticket count (must be at least 1). Determines its
    /// share of CPU time relative to its siblings via stride scheduling.
    pub fn tickets(mut self, tickets: u32) -> Self {
        self.tickets = tickets.max(1);
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Spawns the fiber, running `f` on it the next time the scheduler
    /// picks it. Returns a [`JoinHandle`] the caller can block on to
    /// retrieve `f`'s return value.
    pub fn spawn<F, T>(self, f: F) -> Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + 'static,
        T: 'static,
    {
        let result = Rc::new(RefCell::new(None));
        let result_slot = Rc::clone(&result);
        let id = scheduler::spawn(self.tickets, self.stack_size, self.name, move || {
            let value = f();
            *result_slot.borrow_mut() = Some(value);
        })?;
        Ok(JoinHandle { id, result })
    }
}

/// A handle to a spawned fiber that can be joined to retrieve its result,
/// analogous to `std::thread::JoinHandle`.
pub struct JoinHandle<T> {
    id: FiberId,
    result: Rc<RefCell<Option<T>>>,
}

impl<T> JoinHandle<T> {
    pub fn fiber_id(&self) -> FiberId {
        self.id
    }

    /// Blocks the calling fiber until the joined fiber terminates, then
    /// returns its result. Panics if called twice or if the fiber panicked
    /// instead of returning (mirroring `thread::JoinHandle::join`'s
    /// `Result`, simplified since fiber panics currently abort the
    /// process — see the crate-level docs).
    pub fn join(self) -> T {
        scheduler::join(self.id).expect("joined fiber id became invalid");
        self.result
            .borrow_mut()
            .take()
            .expect("fiber terminated without recording a result")
    }
}

/// A join handle for a fiber spawned without a return value.
pub type UnitJoinHandle = JoinHandle<()>;
