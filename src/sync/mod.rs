//! Synchronization primitives built on the scheduler's park/wake queues:
//! a mutex and a condition variable, both fiber-scoped rather than
//! OS-thread-scoped.

pub(crate) mod condvar;
pub(crate) mod mutex;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard};
