//! x86_64 implementation of context switching

use super::Bootstrap;
use std::arch::naked_asm;

/// Saved CPU context of a suspended coroutine
///
/// On x86_64 System V ABI, these are the callee-saved registers
/// that must be preserved across function calls. The record lives on the
/// suspended context's own stack, directly below the address
/// `context_switch` will `ret` to.
#[repr(C)]
#[derive(Debug, Clone, Default)]
#[allow(dead_code)] // only accessed from assembly
pub struct Context {
    rbx: u64,
    /// Frame pointer
    rbp: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
}

impl Context {
    /// Build the synthetic first-run frame at the top of a fresh stack.
    ///
    /// Stack layout (growing downward):
    ///   top - 8:   `bootstrap`
    ///   top - 16:  `data`
    ///   top - 24:  return address (trampoline)
    ///   top - 72:  zeroed `Context`
    ///
    /// `context_switch` pops the registers and `ret`s into the trampoline
    /// with RSP = top - 16, which is 16-byte aligned for the trampoline's
    /// `call`. RBP starts at zero so frame walks stop at the trampoline.
    ///
    /// # Safety
    /// `top` must be 16-byte aligned and the 72 bytes below it must be
    /// writable memory owned by the new coroutine.
    pub unsafe fn install(top: *mut u8, bootstrap: Bootstrap, data: *mut u8) -> *mut Context {
        debug_assert_eq!(top as usize % 16, 0);
        unsafe {
            let words = top.cast::<usize>();
            words.sub(1).write(bootstrap as usize);
            words.sub(2).write(data as usize);
            words.sub(3).write(trampoline as usize);

            let context = words.sub(3).cast::<Context>().sub(1);
            context.write(Context::default());
            context
        }
    }
}

/// First code a coroutine runs.
///
/// Entered by `ret` from `context_switch` with RSP pointing at the `data`
/// slot written by `Context::install`.
#[unsafe(naked)]
unsafe extern "C" fn trampoline() -> ! {
    naked_asm!(
        "mov rdi, [rsp]",
        "call qword ptr [rsp + 8]",
        // bootstrap never returns
        "ud2",
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
    naked_asm!(
        // Save callee-saved registers on the current stack
        "sub rsp, 0x30",
        "mov [rsp + 0x00], rbx",
        "mov [rsp + 0x08], rbp",
        "mov [rsp + 0x10], r12",
        "mov [rsp + 0x18], r13",
        "mov [rsp + 0x20], r14",
        "mov [rsp + 0x28], r15",
        "mov [rdi], rsp",
        // Restore callee-saved registers from the target stack (rsi)
        "mov rsp, rsi",
        "mov rbx, [rsp + 0x00]",
        "mov rbp, [rsp + 0x08]",
        "mov r12, [rsp + 0x10]",
        "mov r13, [rsp + 0x18]",
        "mov r14, [rsp + 0x20]",
        "mov r15, [rsp + 0x28]",
        "add rsp, 0x30",
        // For a fresh coroutine: jumps to the trampoline
        // For a suspended one: returns to where it called context_switch
        "ret",
    );
}
