//! The I/O wait set: fibers parked on a file descriptor becoming
//! readable/writable, polled alongside the sleep list in each scheduler
//! step via a single `poll(2)` call.

use crate::fiber::Tcb;
use std::os::unix::io::RawFd;
use std::rc::Rc;

/// One fiber's registered interest in a file descriptor.
struct Waiter {
    fd: RawFd,
    events: libc::c_short,
    tcb: Rc<Tcb>,
}

/// Growable set of pending I/O waits, backed by a plain `Vec` (see
/// `SPEC_FULL.md`'s note on the original fixed-128 capacity being made
/// growable here).
#[derive(Default)]
pub struct IoWaitSet {
    waiters: Vec<Waiter>,
}

impl IoWaitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fd: RawFd, events: libc::c_short, tcb: Rc<Tcb>) {
        self.waiters.push(Waiter { fd, events, tcb });
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Polls every registered fd with the given timeout (`None` = block
    /// indefinitely, `Some(ZERO)` = return immediately) and removes +
    /// returns the fibers whose fds became ready.
    pub fn poll_and_drain_ready(&mut self, timeout: Option<std::time::Duration>) -> crate::error::Result<Vec<Rc<Tcb>>> {
        if self.waiters.is_empty() {
            if let Some(d) = timeout {
                if !d.is_zero() {
                    std::thread::sleep(d);
                }
            }
            return Ok(Vec::new());
        }

        let mut pollfds: Vec<libc::pollfd> = self
            .waiters
            .iter()
            .map(|w| libc::pollfd {
                fd: w.fd,
                events: w.events,
                revents: 0,
            })
            .collect();

        let timeout_ms: i32 = match timeout {
            None => -1,
            Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
        };

        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(crate::error::Error::Io(err));
        }

        let mut ready = Vec::new();
        let mut remaining = Vec::with_capacity(self.waiters.len());
        for (waiter, pfd) in self.waiters.drain(..).zip(pollfds.into_iter()) {
            if pfd.revents != 0 {
                ready.push(waiter.tcb);
            } else {
                remaining.push(waiter);
            }
        }
        self.waiters = remaining;
        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_respects_timeout_without_blocking_forever() {
        let mut set = IoWaitSet::new();
        let start = std::time::Instant::now();
        let ready = set.poll_and_drain_ready(Some(std::time::Duration::from_millis(5))).unwrap();
        assert!(ready.is_empty());
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn pipe_write_end_is_reported_writable() {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        let (read_fd, write_fd) = (fds[0], fds[1]);

        let stack = crate::stack::Stack::new(crate::stack::DEFAULT_STACK_SIZE).unwrap();
        let ctx = crate::context::Context::new(stack.top(), std::ptr::null_mut());
        let tcb = Tcb::new(crate::fiber::FiberId(1), ctx, stack, 100, None);

        let mut set = IoWaitSet::new();
        set.register(write_fd, libc::POLLOUT, tcb);
        let ready = set
            .poll_and_drain_ready(Some(std::time::Duration::from_millis(100)))
            .unwrap();
        assert_eq!(ready.len(), 1);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
