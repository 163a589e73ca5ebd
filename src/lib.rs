//! A single-OS-thread, strictly cooperative green-thread runtime.
//!
//! Fibers are scheduled with [stride scheduling][stride]: each fiber is
//! assigned a number of tickets, and the scheduler always resumes
//! whichever runnable fiber has accumulated the least "pass" so far,
//! giving every fiber a CPU share proportional to its tickets without
//! needing a global notion of wall-clock time slices.
//!
//! [stride]: https://en.wikipedia.org/wiki/Stride_scheduling
//!
//! ```no_run
//! use fiberrt::{self, SchedulerConfig};
//! use std::time::Duration;
//!
//! fiberrt::init(SchedulerConfig::default());
//! fiberrt::create(|| {
//!     println!("hello from a fiber");
//!     fiberrt::sleep(Duration::from_millis(10));
//!     println!("still here after sleeping");
//! });
//! fiberrt::run().unwrap();
//! ```
//!
//! # What this crate does not do
//!
//! There is exactly one OS thread involved: fibers never run in parallel,
//! only interleaved, and nothing here preempts a fiber that never yields,
//! sleeps, or blocks on I/O or a sync primitive. There are no real-time
//! scheduling guarantees, no stack growth or relocation, and no state is
//! persisted across process restarts. A dashboard, a metrics exporter,
//! demo workloads, and a signal-based preemption adapter are all
//! deliberately left to separate, out-of-tree crates that would consume
//! [`metrics::for_each_fiber`] and friends; this crate only provides the
//! primitives they'd need.

pub mod clock;
pub mod error;
pub mod io;
pub mod metrics;
pub mod stack;
pub mod sync;

mod context;
mod fiber;
mod scheduler;

pub use error::{Error, Result};
pub use fiber::{
    Builder, FiberId, FiberSnapshot, FiberState, JoinHandle, UnitJoinHandle, DEFAULT_TICKETS,
    STRIDE_CONSTANT,
};
pub use scheduler::SchedulerConfig;

use std::time::Duration;

/// Initializes the scheduler on the calling OS thread. Must be called
/// once, before any other function in this crate. The runtime is
/// strictly single-threaded: each OS thread that wants to run fibers
/// needs its own call to `init`.
pub fn init(config: SchedulerConfig) {
    scheduler::init(config)
}

/// Shorthand for `init(SchedulerConfig::default())`.
pub fn init_default() {
    scheduler::init(SchedulerConfig::default())
}

/// Spawns a fiber running `f` with the default ticket count, discarding
/// its result. This is the closure-based equivalent of the classic
/// `create(entry, arg)` signature: `arg` becomes whatever `f` captures.
pub fn create<F>(f: F) -> FiberId
where
    F: FnOnce() + 'static,
{
    Builder::new()
        .spawn(f)
        .expect("failed to allocate a stack for the new fiber")
        .fiber_id()
}

/// Spawns a fiber and returns a [`JoinHandle`] that can retrieve its
/// return value.
pub fn spawn<F, T>(f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + 'static,
    T: 'static,
{
    Builder::new().spawn(f)
}

/// Like [`spawn`], but with an explicit ticket count instead of
/// [`DEFAULT_TICKETS`].
pub fn spawn_with_tickets<F, T>(f: F, tickets: u32) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + 'static,
    T: 'static,
{
    Builder::new().tickets(tickets).spawn(f)
}

/// Voluntarily yields the CPU to another runnable fiber. A no-op (aside
/// from a context switch out and back in) if no other fiber is runnable.
pub fn yield_now() {
    scheduler::yield_now()
}

/// Suspends the current fiber for at least `duration`. Other fibers run
/// in the meantime; the OS thread itself blocks in `poll(2)` rather than
/// busy-waiting when nothing else is runnable.
pub fn sleep(duration: Duration) {
    scheduler::sleep(duration)
}

/// Terminates the current fiber immediately, without running any of its
/// remaining local `Drop` implementations. Prefer returning from the
/// fiber's closure when possible; use this only for an early abort.
pub fn exit() -> ! {
    scheduler::exit()
}

/// Blocks the calling fiber (or, if called outside of any fiber, drives
/// the scheduler directly) until fiber `id` terminates.
pub fn join(id: FiberId) -> Result<()> {
    scheduler::join(id)
}

/// Returns the id of the currently running fiber, or `FiberId(0)` if
/// called from outside any fiber (the OS thread driving the scheduler
/// itself).
pub fn self_id() -> FiberId {
    scheduler::self_id()
}

/// Changes fiber `id`'s ticket count, which takes effect the next time
/// its stride is advanced. Its already-accumulated `pass` is left
/// untouched.
pub fn set_tickets(id: FiberId, tickets: u32) -> Result<()> {
    scheduler::set_tickets(id, tickets)
}

/// Runs a single scheduler step: drains expired timers and ready file
/// descriptors, then switches into the next fiber by smallest `pass`.
/// Most programs should call [`run`] instead; `step` is exposed for
/// callers that want to interleave their own work with the scheduler's
/// driving loop.
pub fn step() -> Result<()> {
    scheduler::step()
}

/// Drives the scheduler until no fiber is runnable, sleeping, or waiting
/// on I/O — i.e. until every fiber spawned (directly or transitively) has
/// terminated.
pub fn run() -> Result<()> {
    while scheduler::has_work() {
        scheduler::step()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    // Each test below spawns its own OS thread so the `thread_local`
    // scheduler state doesn't leak between tests run in the same process.
    fn in_fresh_runtime<F: FnOnce() + Send + 'static>(f: F) {
        std::thread::spawn(move || {
            init_default();
            f();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn two_fibers_both_run_to_completion() {
        in_fresh_runtime(|| {
            let order = Rc::new(RefCell::new(Vec::new()));
            let o1 = Rc::clone(&order);
            let o2 = Rc::clone(&order);
            create(move || o1.borrow_mut().push(1));
            create(move || o2.borrow_mut().push(2));
            run().unwrap();
            let mut seen = order.borrow().clone();
            seen.sort();
            assert_eq!(seen, vec![1, 2]);
        });
    }

    #[test]
    fn join_waits_for_fiber_to_finish() {
        in_fresh_runtime(|| {
            let flag = Rc::new(RefCell::new(false));
            let flag2 = Rc::clone(&flag);
            let handle = spawn(move || {
                sleep(Duration::from_millis(1));
                *flag2.borrow_mut() = true;
                42
            })
            .unwrap();
            let id = handle.fiber_id();
            create(move || {
                join(id).unwrap();
                assert!(*flag.borrow());
            });
            run().unwrap();
        });
    }

    #[test]
    fn self_id_outside_any_fiber_is_zero() {
        in_fresh_runtime(|| {
            assert_eq!(self_id(), FiberId(0));
        });
    }

    #[test]
    fn deadlock_is_detected_when_nothing_can_wake_a_blocked_fiber() {
        in_fresh_runtime(|| {
            let mutex = Rc::new(crate::sync::Mutex::new(0));

            let held_forever = Rc::clone(&mutex);
            create(move || {
                // Leak the guard: the lock is taken and never released,
                // and this fiber then terminates normally.
                std::mem::forget(held_forever.lock());
            });

            let waiter = Rc::clone(&mutex);
            create(move || {
                let _ = waiter.lock(); // parks forever; nothing will ever unlock
            });

            // Draining manually (instead of `run`) lets us observe the
            // `Err` rather than have `run` stop silently.
            let mut last = Ok(());
            for _ in 0..10 {
                last = step();
                if last.is_err() {
                    break;
                }
            }
            assert!(matches!(last, Err(Error::Deadlock { .. })));
        });
    }
}
