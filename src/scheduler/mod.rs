//! The unified scheduler step: the single place that drains expired
//! timers, drains ready file descriptors, picks the next fiber by stride,
//! and performs the context switch onto it.
//!
//! All scheduler state is `thread_local` rather than behind a shared
//! `static mut` pointer, since the runtime is explicitly single-threaded:
//! a `RefCell` panic on a reentrant borrow is a much louder failure mode
//! than silently racing a raw pointer would be.

mod io_set;
mod ready_heap;
mod sleep;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::fiber::{BlockedOn, FiberId, FiberSnapshot, FiberState, Tcb};
use crate::stack::Stack;
use io_set::IoWaitSet;
use log::{debug, trace, warn};
use ready_heap::ReadyHeap;
use sleep::SleepList;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Tunables read once at [`crate::init`] time.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Stack size handed to a fiber that doesn't request its own.
    pub stack_size: usize,
    /// Initial capacity reserved in the ready heap; it still grows past
    /// this if more fibers are runnable at once.
    pub ready_heap_capacity: usize,
    /// Upper bound on how long a single `step()` may block in `poll(2)`
    /// when nothing is ready and no timer is about to fire. Keeps the
    /// scheduler responsive to fibers another OS-level signal might
    /// someday wake (see the out-of-scope preemption adapter).
    pub default_poll_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stack_size: crate::stack::DEFAULT_STACK_SIZE,
            ready_heap_capacity: 1024,
            default_poll_timeout: Duration::from_millis(100),
        }
    }
}

struct Scheduler {
    config: SchedulerConfig,
    ready: ReadyHeap,
    sleep_list: SleepList,
    io_set: IoWaitSet,
    all_fibers: Vec<Rc<Tcb>>,
    current: Option<Rc<Tcb>>,
    main_ctx: Context,
    next_id: u64,
    // The fiber that terminated during the *previous* step, whose stack
    // can only be safely unmapped now that nothing is executing on it.
    zombie: Option<Rc<Tcb>>,
    context_switches: u64,
}

thread_local! {
    static SCHEDULER: RefCell<Option<Scheduler>> = RefCell::new(None);
}

fn with_scheduler<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    SCHEDULER.with(|cell| {
        let guard = cell.borrow();
        let sched = guard.as_ref().expect("fiberrt::init was not called on this thread");
        f(sched)
    })
}

fn with_scheduler_mut<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    SCHEDULER.with(|cell| {
        let mut guard = cell.borrow_mut();
        let sched = guard.as_mut().expect("fiberrt::init was not called on this thread");
        f(sched)
    })
}

/// Initializes the scheduler on the calling OS thread. Must be called
/// once before any other runtime function. Calling it twice on the same
/// thread is a no-op (logged at `warn`).
pub fn init(config: SchedulerConfig) {
    SCHEDULER.with(|cell| {
        let mut guard = cell.borrow_mut();
        if guard.is_some() {
            warn!("fiberrt::init called more than once on this thread; ignoring");
            return;
        }
        *guard = Some(Scheduler {
            ready: ReadyHeap::with_capacity(config.ready_heap_capacity),
            sleep_list: SleepList::new(),
            io_set: IoWaitSet::new(),
            all_fibers: Vec::new(),
            current: None,
            main_ctx: Context::default(),
            next_id: 1,
            zombie: None,
            context_switches: 0,
            config,
        });
    });
}

fn wake(s: &mut Scheduler, tcb: Rc<Tcb>) {
    trace!("fiber {} woken", tcb.id);
    tcb.state.set(FiberState::Ready);
    tcb.blocked_on.set(None);
    tcb.waiting_fd.set(None);
    tcb.wake_at.set(None);
    s.ready.push(tcb);
}

/// Spawns a new fiber running `body`, returning its id once it has been
/// placed on the ready heap (it has not run yet).
pub(crate) fn spawn(
    tickets: u32,
    stack_size: usize,
    name: Option<String>,
    body: impl FnOnce() + 'static,
) -> Result<FiberId> {
    let boxed: Box<dyn FnOnce()> = Box::new(body);
    let data_ptr = Box::into_raw(Box::new(boxed)) as *mut ();

    let stack = Stack::new(stack_size)?;
    let stack_top = stack.top();
    let ctx = Context::new(stack_top, data_ptr);

    with_scheduler_mut(|s| {
        let id = FiberId(s.next_id);
        s.next_id += 1;
        let tcb = Tcb::new(id, ctx, stack, tickets, name);
        tcb.state.set(FiberState::Ready);
        s.all_fibers.push(Rc::clone(&tcb));
        s.ready.push(tcb);
        debug!("fiber {id} spawned with {tickets} tickets");
        Ok(id)
    })
}

/// Landing point for the trampoline the very first time a fiber's context
/// is switched into. Never returns: once the fiber's body finishes (or
/// calls [`exit`]) control passes back to the scheduler through
/// `terminate_current`, never back up the native call stack.
pub(crate) fn run_new_fiber(data: *mut ()) -> ! {
    let boxed: Box<Box<dyn FnOnce()>> = unsafe { Box::from_raw(data as *mut Box<dyn FnOnce()>) };
    let current = with_scheduler(|s| {
        s.current
            .clone()
            .expect("run_new_fiber entered with no current fiber recorded")
    });
    current.state.set(FiberState::Running);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (*boxed)()));
    if let Err(payload) = result {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());
        log::error!("fiber {} panicked: {msg}", current.id);
    }

    terminate_current()
}

fn switch_out_current() {
    let (my_ctx_ptr, main_ctx_ptr): (*mut Context, *const Context) = with_scheduler(|s| {
        let current = s
            .current
            .clone()
            .expect("a scheduler-parking function was called with no fiber currently running");
        (current.context.get(), &s.main_ctx as *const Context)
    });
    unsafe {
        (*my_ctx_ptr).switch(&*main_ctx_ptr);
    }
}

fn terminate_current() -> ! {
    let current = with_scheduler_mut(|s| {
        let current = s
            .current
            .take()
            .expect("terminate_current called with no current fiber");
        current.state.set(FiberState::Terminated);

        let waiters: Vec<Rc<Tcb>> = current.join_waiters.borrow_mut().drain(..).collect();
        for waiter in waiters {
            wake(s, waiter);
        }

        debug!("fiber {} terminated", current.id);
        s.zombie = Some(Rc::clone(&current));
        current
    });

    let (my_ctx_ptr, main_ctx_ptr): (*mut Context, *const Context) =
        with_scheduler(|s| (current.context.get(), &s.main_ctx as *const Context));
    unsafe {
        (*my_ctx_ptr).switch(&*main_ctx_ptr);
    }
    unreachable!("a terminated fiber's context must never be switched back into");
}

/// Voluntarily gives up the CPU, re-entering the ready heap at the back of
/// its stride cohort. Returns once the scheduler picks this fiber again.
pub fn yield_now() {
    with_scheduler_mut(|s| {
        let current = s
            .current
            .clone()
            .expect("yield_now called outside of a running fiber");
        current.state.set(FiberState::Ready);
        s.ready.push(current);
    });
    switch_out_current();
}

/// Suspends the current fiber for at least `duration`. A zero duration is
/// equivalent to [`yield_now`].
pub fn sleep(duration: Duration) {
    if duration.is_zero() {
        yield_now();
        return;
    }
    with_scheduler_mut(|s| {
        let current = s
            .current
            .clone()
            .expect("sleep called outside of a running fiber");
        current.state.set(FiberState::Blocked);
        current.blocked_on.set(Some(BlockedOn::Sleep));
        current.wake_at.set(Some(Instant::now() + duration));
        s.sleep_list.push(current);
    });
    switch_out_current();
}

/// Blocks the current fiber until `fd` becomes ready for `events`
/// (a `libc::POLLIN`/`POLLOUT` mask). Used by [`crate::io`]'s
/// non-blocking wrappers on `EWOULDBLOCK`.
pub(crate) fn wait_io(fd: RawFd, events: libc::c_short) {
    with_scheduler_mut(|s| {
        let current = s
            .current
            .clone()
            .expect("wait_io called outside of a running fiber");
        current.state.set(FiberState::Blocked);
        current.blocked_on.set(Some(BlockedOn::Io));
        current.waiting_fd.set(Some(fd));
        s.io_set.register(fd, events, current);
    });
    switch_out_current();
}

/// Parks the current fiber on a sync primitive's own wait queue (used by
/// [`crate::sync::Mutex`] and [`crate::sync::Condvar`]).
pub(crate) fn park_current(on: BlockedOn, queue: &RefCell<VecDeque<Rc<Tcb>>>) {
    with_scheduler_mut(|s| {
        let current = s
            .current
            .clone()
            .expect("park_current called outside of a running fiber");
        current.state.set(FiberState::Blocked);
        current.blocked_on.set(Some(on));
        queue.borrow_mut().push_back(current);
    });
    switch_out_current();
}

/// Wakes (moves back onto the ready heap) the front of `queue`, if any.
/// Returns whether a fiber was woken.
pub(crate) fn wake_one(queue: &RefCell<VecDeque<Rc<Tcb>>>) -> bool {
    let woken = queue.borrow_mut().pop_front();
    match woken {
        Some(tcb) => {
            with_scheduler_mut(|s| wake(s, tcb));
            true
        }
        None => false,
    }
}

/// Wakes every fiber parked on `queue`.
pub(crate) fn wake_all(queue: &RefCell<VecDeque<Rc<Tcb>>>) {
    let all: Vec<_> = queue.borrow_mut().drain(..).collect();
    for tcb in all {
        with_scheduler_mut(|s| wake(s, tcb));
    }
}

/// Terminates the current fiber immediately without returning from its
/// entry closure. Local variables on its stack are *not* dropped: this
/// mirrors the abrupt-exit semantics of the C runtime this crate's
/// scheduling model is drawn from, not an oversight. Prefer simply
/// returning from the fiber's closure when possible.
pub fn exit() -> ! {
    terminate_current()
}

/// Blocks the current fiber until fiber `id` terminates.
pub(crate) fn join(id: FiberId) -> Result<()> {
    loop {
        let target = with_scheduler(|s| s.all_fibers.iter().find(|t| t.id == id).cloned());
        let target = target.ok_or(Error::InvalidFiberId(id.0))?;

        if target.state.get() == FiberState::Terminated {
            return Ok(());
        }

        let current = with_scheduler(|s| s.current.clone());
        let current = match current {
            Some(c) if c.id == id => return Err(Error::InvalidFiberId(id.0)),
            Some(c) => c,
            None => {
                // Called from outside any fiber (the driving OS thread):
                // spin the scheduler until the target finishes.
                step()?;
                continue;
            }
        };

        target.join_waiters.borrow_mut().push_back(Rc::clone(&current));
        current.state.set(FiberState::Blocked);
        current.blocked_on.set(Some(BlockedOn::Join));
        switch_out_current();
    }
}

pub(crate) fn self_id() -> FiberId {
    with_scheduler(|s| s.current.as_ref().map(|t| t.id).unwrap_or(FiberId(0)))
}

pub(crate) fn set_tickets(id: FiberId, tickets: u32) -> Result<()> {
    with_scheduler(|s| {
        s.all_fibers
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.set_tickets(tickets))
            .ok_or(Error::InvalidFiberId(id.0))
    })
}

pub(crate) fn context_switch_count() -> u64 {
    with_scheduler(|s| s.context_switches)
}

pub(crate) fn for_each_fiber(mut f: impl FnMut(&FiberSnapshot)) {
    with_scheduler(|s| {
        for tcb in &s.all_fibers {
            f(&FiberSnapshot::from(tcb));
        }
    });
}

/// Runs one iteration of the scheduler: drains expired timers and ready
/// file descriptors, reclaims the previous step's terminated fiber's
/// stack, then picks and switches into the next runnable fiber by
/// smallest `pass`.
///
/// Returns `Ok(())` if it made progress or is legitimately waiting on a
/// timer/I/O event; returns [`Error::Deadlock`] if every remaining fiber
/// is blocked on something only another (already-finished) fiber could
/// have woken.
pub fn step() -> Result<()> {
    let now = Instant::now();

    with_scheduler_mut(|s| {
        let expired = s.sleep_list.drain_expired(now);
        for tcb in expired {
            wake(s, tcb);
        }
        if let Some(zombie) = s.zombie.take() {
            trace!("reclaiming stack of terminated fiber {}", zombie.id);
            *zombie.stack.borrow_mut() = None;
        }
    });

    let timeout = with_scheduler(|s| {
        if !s.ready.is_empty() {
            Duration::ZERO
        } else if let Some(bound) = s.sleep_list.next_wake_in(now) {
            bound.min(s.config.default_poll_timeout)
        } else {
            s.config.default_poll_timeout
        }
    });

    let io_ready = with_scheduler_mut(|s| s.io_set.poll_and_drain_ready(Some(timeout)))?;
    with_scheduler_mut(|s| {
        for tcb in io_ready {
            wake(s, tcb);
        }
    });

    let next = with_scheduler_mut(|s| s.ready.pop_min());
    let next = match next {
        Some(tcb) => tcb,
        None => {
            return with_scheduler(|s| {
                if !s.sleep_list.is_empty() || !s.io_set.is_empty() {
                    // Legitimately idle: something will eventually wake on
                    // its own. Not a deadlock.
                    return Ok(());
                }
                let mut sleeping = 0;
                let mut io_waiting = 0;
                let mut on_mutex = 0;
                let mut on_cond = 0;
                let mut on_join = 0;
                let mut blocked = 0;
                for t in &s.all_fibers {
                    if t.state.get() != FiberState::Blocked {
                        continue;
                    }
                    blocked += 1;
                    match t.blocked_on.get() {
                        Some(BlockedOn::Sleep) => sleeping += 1,
                        Some(BlockedOn::Io) => io_waiting += 1,
                        Some(BlockedOn::Mutex) => on_mutex += 1,
                        Some(BlockedOn::Condvar) => on_cond += 1,
                        Some(BlockedOn::Join) => on_join += 1,
                        None => {}
                    }
                }
                if blocked > 0 {
                    Err(Error::Deadlock {
                        blocked,
                        sleeping,
                        io_waiting,
                        on_mutex,
                        on_cond,
                        on_join,
                    })
                } else {
                    // Nothing blocked, nothing ready: the scheduler is
                    // simply quiescent (every fiber has terminated).
                    Ok(())
                }
            });
        }
    };

    let (main_ctx_ptr, next_ctx_ptr): (*mut Context, *const Context) = with_scheduler_mut(|s| {
        next.pass.set(next.pass.get() + next.stride.get());
        next.state.set(FiberState::Running);
        s.current = Some(Rc::clone(&next));
        s.context_switches += 1;
        (&mut s.main_ctx as *mut Context, next.context.get() as *const Context)
    });

    unsafe {
        (*main_ctx_ptr).switch(&*next_ctx_ptr);
    }

    with_scheduler_mut(|s| s.current = None);
    Ok(())
}

/// Whether the scheduler has any remaining work at all: a runnable fiber,
/// a pending timer, or a pending I/O wait. Used to know when [`crate::run`]
/// can stop looping.
pub fn has_work() -> bool {
    with_scheduler(|s| {
        !s.ready.is_empty()
            || !s.sleep_list.is_empty()
            || !s.io_set.is_empty()
            || s.all_fibers.iter().any(|t| t.state.get() == FiberState::Blocked)
    })
}
