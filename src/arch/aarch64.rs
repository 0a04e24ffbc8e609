//! aarch64 implementation of context switching

use super::Bootstrap;
use std::arch::naked_asm;

/// Saved CPU context of a suspended coroutine
///
/// On aarch64 (AAPCS64), these are the callee-saved registers
/// that must be preserved across function calls:
/// - x19-x28: general purpose callee-saved registers
/// - fp, lr: frame pointer and the address `ret` resumes at
/// - d8-d15: floating-point/SIMD callee-saved registers (lower 64 bits of v8-v15)
#[repr(C)]
#[derive(Debug, Clone, Default)]
#[allow(dead_code)] // only accessed from assembly
pub struct Context {
    x19: u64,
    x20: u64,
    x21: u64,
    x22: u64,
    x23: u64,
    x24: u64,
    x25: u64,
    x26: u64,
    x27: u64,
    x28: u64,
    /// Frame pointer
    fp: u64,
    /// Link register (return address)
    lr: u64,
    d8: u64,
    d9: u64,
    d10: u64,
    d11: u64,
    d12: u64,
    d13: u64,
    d14: u64,
    d15: u64,
}

impl Context {
    /// Build the synthetic first-run frame at the top of a fresh stack.
    ///
    /// Stack layout (growing downward):
    ///   top - 8:    `bootstrap`
    ///   top - 16:   `data`
    ///   top - 176:  `Context` with lr = trampoline, everything else zero
    ///
    /// `context_switch` pops the registers and `ret`s through lr into the
    /// trampoline with SP = top - 16.
    ///
    /// # Safety
    /// `top` must be 16-byte aligned and the 176 bytes below it must be
    /// writable memory owned by the new coroutine.
    pub unsafe fn install(top: *mut u8, bootstrap: Bootstrap, data: *mut u8) -> *mut Context {
        debug_assert_eq!(top as usize % 16, 0);
        unsafe {
            let words = top.cast::<usize>();
            words.sub(1).write(bootstrap as usize);
            words.sub(2).write(data as usize);

            let context = words.sub(2).cast::<Context>().sub(1);
            context.write(Context {
                lr: trampoline as usize as u64,
                ..Default::default()
            });
            context
        }
    }
}

/// First code a coroutine runs.
///
/// Entered by `ret` from `context_switch` with SP pointing at the `data`
/// slot written by `Context::install`.
#[unsafe(naked)]
unsafe extern "C" fn trampoline() -> ! {
    naked_asm!(
        "ldp x0, x1, [sp]",
        "blr x1",
        // bootstrap never returns
        "brk #0x1",
    );
}

/// Switch from one context to another
///
/// Pushes the callee-saved registers, stores the resulting stack pointer in
/// `*from`, then adopts `to` as the stack pointer and pops the registers
/// saved there. This function returns when another context switches back
/// to the one stored in `*from`.
///
/// # Safety
/// `from` must be valid for writes. `to` must have been produced by a
/// previous `context_switch` or by `Context::install`, and must not be
/// resumed twice without an intervening suspension.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_from: *mut *mut Context, _to: *mut Context) {
    // Arguments: x0 = from, x1 = to
    naked_asm!(
        // Save callee-saved registers on the current stack
        "sub sp, sp, #0xa0",
        "stp x19, x20, [sp, #0x00]",
        "stp x21, x22, [sp, #0x10]",
        "stp x23, x24, [sp, #0x20]",
        "stp x25, x26, [sp, #0x30]",
        "stp x27, x28, [sp, #0x40]",
        "stp fp, lr,   [sp, #0x50]",
        "stp d8, d9,   [sp, #0x60]",
        "stp d10, d11, [sp, #0x70]",
        "stp d12, d13, [sp, #0x80]",
        "stp d14, d15, [sp, #0x90]",
        "mov x9, sp",
        "str x9, [x0]",
        // Restore callee-saved registers from the target stack (x1)
        "mov sp, x1",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp fp, lr,   [sp, #0x50]",
        "ldp d8, d9,   [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #0xa0",
        // Return to the new context
        "ret",
    );
}
