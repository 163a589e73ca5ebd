//! x86_64 System V ABI context switch.
//!
//! `fiber_switch(old_sp: *mut usize, new_sp: usize)` saves the six
//! callee-saved general purpose registers (`rbp`, `rbx`, `r12`-`r15`) on
//! the current stack, stashes the resulting `rsp` through `old_sp`, then
//! loads `rsp` from `new_sp` and pops the same six registers back off
//! *that* stack before returning. Because the function is symmetric, the
//! very first "return" into a freshly primed fiber stack (see
//! [`init_stack`]) is just the `ret` at the bottom popping a trampoline
//! address planted there in advance.

use std::arch::global_asm;

global_asm!(
    ".text",
    ".global fiber_switch",
    ".p2align 4",
    "fiber_switch:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, rsi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
);

global_asm!(
    ".text",
    ".global fiber_trampoline",
    ".p2align 4",
    "fiber_trampoline:",
    // Landed here via the `ret` at the end of fiber_switch, with rsp equal
    // to the stack's top (16-byte aligned) and r12 holding the entry data
    // pointer planted by init_stack.
    "mov rdi, r12",
    "call fiber_trampoline_entry",
    "ud2",
);

extern "C" {
    fn fiber_switch(old_sp: *mut usize, new_sp: usize);
}

/// Called from the `fiber_trampoline` asm stub the first time a fiber's
/// context is switched into. Dispatches into the scheduler, which knows
/// (via thread-local state) which fiber is being started and runs its
/// boxed entry closure.
#[no_mangle]
extern "C" fn fiber_trampoline_entry(data: *mut ()) -> ! {
    crate::scheduler::run_new_fiber(data)
}

/// Builds the initial stack frame for a context that has never run: a
/// layout matching what `fiber_switch` would have produced had it just
/// pushed six zeroed registers and a trampoline return address.
///
/// # Safety
/// `stack_top` must point one-past-the-end of a writable region at least
/// 64 bytes in size and 16-byte aligned (as produced by `Stack::top`).
pub unsafe fn init_stack(stack_top: usize, entry_data: *mut ()) -> usize {
    debug_assert_eq!(stack_top % 16, 0);

    let sp = (stack_top - 7 * 8) as *mut usize;
    // From low address to high: r15, r14, r13, r12, rbx, rbp, return addr.
    sp.add(0).write(0); // r15
    sp.add(1).write(0); // r14
    sp.add(2).write(0); // r13
    sp.add(3).write(entry_data as usize); // r12: entry data pointer
    sp.add(4).write(0); // rbx
    sp.add(5).write(0); // rbp
    sp.add(6).write(fiber_trampoline as usize); // return address

    sp as usize
}

extern "C" {
    fn fiber_trampoline();
}

#[inline]
pub unsafe fn switch(old_sp: &mut usize, new_sp: usize) {
    fiber_switch(old_sp as *mut usize, new_sp);
}
