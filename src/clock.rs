//! Monotonic time helpers used by the scheduler's sleep list and by
//! callers wanting to measure elapsed fiber-time.
//!
//! Unlike the FFI-backed `tarantool::clock` module this one goes straight
//! through `std::time`, since there is no embedding host clock to defer to.
//!
//! - [`monotonic()`](fn.monotonic.html) - seconds since an unspecified epoch, never goes backwards
//! - [`monotonic64()`](fn.monotonic64.html) - nanoseconds since an unspecified epoch
//! - [`time()`](fn.time.html) - wall clock seconds since 1970-01-01
//! - [`process()`](fn.process.html) - processor time consumed by this process, in seconds

use once_cell::sync::Lazy;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A duration long enough to stand in for "wait forever" without
/// overflowing arithmetic on deadlines.
pub const INFINITY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

static START: Lazy<Instant> = Lazy::new(Instant::now);

/// Seconds elapsed on the monotonic clock since the process started
/// tracking it. Never decreases, unaffected by wall-clock adjustments.
#[inline]
pub fn monotonic() -> f64 {
    START.elapsed().as_secs_f64()
}

/// Nanoseconds elapsed on the monotonic clock since the process started
/// tracking it.
#[inline]
pub fn monotonic64() -> u64 {
    START.elapsed().as_nanos() as u64
}

/// The current [`Instant`], suitable for arithmetic against sleep
/// deadlines and wait-set wake times.
#[inline]
pub fn instant_now() -> Instant {
    Instant::now()
}

/// Wall clock time in seconds since the Unix epoch.
#[inline]
pub fn time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Processor time consumed by this process so far, in seconds.
///
/// Derived from `clock_gettime(CLOCK_PROCESS_CPUTIME_ID)`. Useful for
/// asserting that an idle scheduler is actually parked in `poll(2)`
/// rather than busy-spinning: wall-clock time can pass freely while this
/// stays flat.
#[inline]
pub fn process() -> f64 {
    process64() as f64 / 1_000_000_000.0
}

/// See: [`process`].
pub fn process64() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out-pointer for the duration of the call.
    unsafe {
        libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}
