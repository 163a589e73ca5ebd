//! Error handling for the runtime.
//!
//! Scheduler misuse (ready heap overflow, deadlock) and syscall failures
//! funnel into a single [`Error`] enum so callers can match on which
//! subsystem failed rather than parsing a message string.

use std::io;

/// A specialized [`Result`] type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents all error cases produced by the runtime.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Reserving or protecting a fiber's stack via `mmap`/`mprotect` failed.
    #[error("failed to allocate fiber stack: {0}")]
    StackAlloc(io::Error),

    /// The ready heap reached its configured capacity and growth was
    /// disabled. Fatal: the scheduler cannot make progress.
    #[error("ready queue exhausted its capacity of {capacity} fibers")]
    ReadyHeapOverflow { capacity: usize },

    /// `step()` found every live fiber blocked with nothing that could ever
    /// wake them: no pending timers, no pending I/O, no other fiber able to
    /// run. Fatal: the scheduler cannot make progress.
    #[error(
        "deadlock detected: {blocked} fiber(s) blocked \
         ({sleeping} sleeping, {io_waiting} waiting on i/o, \
         {on_mutex} on a mutex, {on_cond} on a condvar, {on_join} on a join), \
         none of which can ever be woken"
    )]
    Deadlock {
        blocked: usize,
        sleeping: usize,
        io_waiting: usize,
        on_mutex: usize,
        on_cond: usize,
        on_join: usize,
    },

    /// A non-blocking read/write/accept wrapper's underlying syscall failed
    /// for a reason other than "would block". Not fatal, returned to the
    /// caller.
    #[error("i/o error: {0}")]
    Io(io::Error),

    /// A fiber id passed to `join`/`set_tickets`/cancellation doesn't name a
    /// fiber the scheduler has ever created.
    #[error("no such fiber: {0}")]
    InvalidFiberId(u64),

    /// The runtime's free functions (`create`, `sleep`, `yield_now`, ...)
    /// were called before [`crate::init`] or outside of a running
    /// scheduler step.
    #[error("fiber runtime is not initialized on this thread")]
    NotInitialized,
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_message_is_informative() {
        let e = Error::Deadlock {
            blocked: 3,
            sleeping: 1,
            io_waiting: 0,
            on_mutex: 1,
            on_cond: 1,
            on_join: 0,
        };
        let msg = e.to_string();
        assert!(msg.contains("3 fiber"));
        assert!(msg.contains("deadlock"));
    }
}
