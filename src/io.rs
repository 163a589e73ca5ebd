//! Cooperative, non-blocking I/O wrappers: attempt the syscall, and on
//! `EWOULDBLOCK`/`EAGAIN` suspend the calling fiber until the scheduler's
//! `poll` reports the descriptor ready, then retry. Mirrors
//! `tarantool::coio`'s `read`/`write` shape, generalized to also cover
//! `accept`.

use crate::error::Result;
use crate::scheduler;
use std::io;
use std::os::unix::io::RawFd;

/// Puts `fd` into non-blocking mode. Every descriptor used with this
/// module's functions must have this called on it first (a `TcpListener`
/// or `UnixListener`'s underlying fd, typically, once at setup time).
pub fn set_nonblocking(fd: RawFd) -> Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let rc = libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }
    }
    Ok(())
}

fn is_would_block(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock)
}

/// Reads into `buf`, suspending the fiber and retrying as many times as
/// it takes for `fd` to become readable, rather than blocking the OS
/// thread. Returns `Ok(0)` on EOF, same as a normal blocking read.
pub fn read(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    loop {
        let rc = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = io::Error::last_os_error();
        if is_would_block(&err) {
            scheduler::wait_io(fd, libc::POLLIN);
            continue;
        }
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(err.into());
    }
}

/// Writes all of `buf`, suspending and retrying on backpressure until
/// every byte has been accepted by the kernel.
pub fn write(fd: RawFd, buf: &[u8]) -> Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        let rc = unsafe {
            libc::write(
                fd,
                buf[written..].as_ptr().cast(),
                buf.len() - written,
            )
        };
        if rc >= 0 {
            written += rc as usize;
            continue;
        }
        let err = io::Error::last_os_error();
        if is_would_block(&err) {
            scheduler::wait_io(fd, libc::POLLOUT);
            continue;
        }
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(err.into());
    }
    Ok(written)
}

/// Accepts a connection on `listen_fd` (which must already be
/// non-blocking), suspending the fiber until one is pending rather than
/// blocking the OS thread. The accepted fd is itself put into non-blocking
/// mode before being returned, so callers can hand it straight to
/// [`read`]/[`write`] without a separate [`set_nonblocking`] call.
pub fn accept(listen_fd: RawFd) -> Result<RawFd> {
    loop {
        let rc = unsafe { libc::accept(listen_fd, std::ptr::null_mut(), std::ptr::null_mut()) };
        if rc >= 0 {
            set_nonblocking(rc)?;
            return Ok(rc);
        }
        let err = io::Error::last_os_error();
        if is_would_block(&err) {
            scheduler::wait_io(listen_fd, libc::POLLIN);
            continue;
        }
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(err.into());
    }
}
