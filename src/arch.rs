//! Architecture-specific register transfer.
//!
//! Each backend provides the same three items:
//! - `Context`: the callee-saved registers of a suspended context
//! - `Context::install`: the synthetic first-run frame builder
//! - `context_switch`: the switch primitive
//!
//! Nothing outside this module touches registers or frame layouts.

/// Routine the trampoline calls with the `data` pointer given to
/// `Context::install`. It must never return.
pub type Bootstrap = unsafe extern "C" fn(*mut u8) -> !;

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use self::x86_64::*;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use self::aarch64::*;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("mycoroutine supports only x86_64 and aarch64");
