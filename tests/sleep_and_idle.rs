//! Verifies that `sleep` never wakes a fiber early, and that an idle
//! scheduler (nothing ready, only a distant timer pending) doesn't
//! busy-spin the OS thread.

use fiberrt::{self, SchedulerConfig};
use std::time::{Duration, Instant};

mod common;

#[test]
fn sleep_never_wakes_before_its_deadline() {
    common::init_logging();
    fiberrt::init(SchedulerConfig::default());

    let requested = Duration::from_millis(30);
    let start = Instant::now();
    fiberrt::create(move || {
        fiberrt::sleep(requested);
    });
    fiberrt::run().unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed >= requested,
        "fiber woke after {elapsed:?}, before its {requested:?} deadline"
    );
}

#[test]
fn idle_scheduler_blocks_instead_of_spinning() {
    // One fiber sleeps for a while and does nothing else; process CPU
    // time burned while waiting for it should be far below the
    // wall-clock time elapsed, since the scheduler should be parked in
    // `poll(2)` rather than spinning `step()` in a tight loop.
    common::init_logging();
    fiberrt::init(SchedulerConfig {
        default_poll_timeout: Duration::from_millis(20),
        ..SchedulerConfig::default()
    });

    let sleep_for = Duration::from_millis(200);
    fiberrt::create(move || {
        fiberrt::sleep(sleep_for);
    });

    let cpu_before = fiberrt::clock::process();
    let wall_start = Instant::now();
    fiberrt::run().unwrap();
    let wall_elapsed = wall_start.elapsed();
    let cpu_after = fiberrt::clock::process();

    let cpu_used = cpu_after - cpu_before;
    assert!(
        cpu_used < wall_elapsed.as_secs_f64() * 0.05,
        "used {cpu_used:.4}s of CPU time over {wall_elapsed:?} of wall time while idle"
    );
}
