//! A condition variable for coordinating fibers around a `Mutex`-guarded
//! predicate, mirroring `tarantool::fiber::Cond`'s wait/signal/broadcast
//! shape but queued through the scheduler's generic park/wake primitive
//! instead of Tarantool's FFI.

use crate::fiber::{BlockedOn, Tcb};
use crate::scheduler;
use crate::sync::mutex::MutexGuard;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A condition variable. Always used together with a [`crate::sync::Mutex`]
/// guarding the predicate being waited on, exactly like
/// `std::sync::Condvar`.
#[derive(Default)]
pub struct Condvar {
    waiters: RefCell<VecDeque<Rc<Tcb>>>,
}

impl Condvar {
    pub fn new() -> Self {
        Self {
            waiters: RefCell::new(VecDeque::new()),
        }
    }

    /// Atomically releases `guard`'s lock and parks the calling fiber
    /// until woken by [`Condvar::notify_one`] or [`Condvar::notify_all`],
    /// then reacquires the lock before returning.
    ///
    /// Single-threaded cooperative scheduling makes the release/park
    /// sequence atomic for free: nothing else can run between dropping
    /// the guard and parking, since both happen on this fiber's own
    /// uninterrupted turn.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = MutexGuard::mutex(&guard);
        drop(guard);
        scheduler::park_current(BlockedOn::Condvar, &self.waiters);
        mutex.lock()
    }

    /// Wakes one waiting fiber, if any.
    pub fn notify_one(&self) {
        scheduler::wake_one(&self.waiters);
    }

    /// Wakes every waiting fiber.
    pub fn notify_all(&self) {
        scheduler::wake_all(&self.waiters);
    }
}
