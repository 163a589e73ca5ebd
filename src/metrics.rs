//! Observability primitives for the runtime. This module doesn't run a
//! dashboard or export Prometheus itself (that's out of scope — see
//! `SPEC_FULL.md`); it exposes the counters and enumeration an external
//! collector would poll, the way `tarantool::fiber::csw` exposes a raw
//! switch counter for tests to assert on rather than for a UI.

pub use crate::fiber::FiberSnapshot;
use crate::scheduler;

/// Total number of context switches the scheduler has performed on this
/// thread since [`crate::init`]. Monotonically increasing.
pub fn context_switch_count() -> u64 {
    scheduler::context_switch_count()
}

/// Calls `f` once per fiber the scheduler has ever created on this
/// thread, in creation order, including terminated ones (see
/// `SPEC_FULL.md`'s note on retaining terminated fibers for enumeration).
pub fn for_each_fiber(f: impl FnMut(&FiberSnapshot)) {
    scheduler::for_each_fiber(f)
}

/// Calls `f` once and reports whether it caused at least one context
/// switch, useful in tests asserting that an operation does or doesn't
/// yield. Mirrors `tarantool::fiber::check_yield`.
pub fn check_yield<F, T>(f: F) -> (T, bool)
where
    F: FnOnce() -> T,
{
    let before = context_switch_count();
    let result = f();
    (result, context_switch_count() != before)
}
