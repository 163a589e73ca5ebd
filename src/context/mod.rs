//! Raw stack-pointer context switching.
//!
//! A [`Context`] is nothing but a saved stack pointer: every other register
//! lives on the stack itself, pushed by [`switch`] before it gives up
//! control and popped by the same function when control returns. This is
//! the boost.context / corosensei style of switch, expressed with
//! `global_asm!` so the crate stays on stable Rust (no `#[naked]`
//! functions).
//!
//! Only x86_64 is implemented; the scheduler simply won't compile on other
//! architectures, matching the runtime's stated single-platform scope.

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
use x86_64 as arch;

#[cfg(not(target_arch = "x86_64"))]
compile_error!("fiberrt's context switch is only implemented for x86_64");

/// An opaque, suspended execution context: a stack pointer and nothing
/// else. `Default` gives the all-zero "no context yet" value used before a
/// fiber has run for the first time, which is never switched into directly.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct Context {
    sp: usize,
}

impl Context {
    /// Builds the initial context for a brand new fiber: a stack primed so
    /// that the first [`switch`] into it lands in the trampoline, which in
    /// turn invokes `entry_data` via [`run_entry`](fn.run_entry.html)-style
    /// dispatch in the scheduler.
    ///
    /// `stack_top` must be 16-byte aligned, as produced by [`crate::stack::Stack::top`].
    pub fn new(stack_top: usize, entry_data: *mut ()) -> Self {
        Self {
            sp: unsafe { arch::init_stack(stack_top, entry_data) },
        }
    }

    /// Switches the CPU from `self` into `next`, saving the caller's
    /// registers onto its own stack and restoring `next`'s. Returns once
    /// some other fiber switches back into `self`.
    ///
    /// # Safety
    /// `self` must be the context currently executing on this OS thread,
    /// and `next` must hold a stack pointer previously produced by
    /// [`Context::new`] or by a prior `switch` into it that has since
    /// suspended (not one that is still running, and not one that has
    /// already terminated and been reclaimed).
    #[inline]
    pub unsafe fn switch(&mut self, next: &Context) {
        arch::switch(&mut self.sp, next.sp);
    }
}
