//! Shared setup for the integration test binaries: installs `env_logger`
//! so `RUST_LOG=trace cargo test -- --nocapture` surfaces the scheduler's
//! `trace!`/`debug!`/`warn!` output, the way the pack's own test suites
//! wire it in.

/// Installs the `env_logger` subscriber for the calling test binary.
/// `try_init` rather than `init`: each `#[test]` fn here runs on its own
/// OS thread, and a second install in the same process would otherwise
/// panic.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
