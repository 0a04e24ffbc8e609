//! Stackful cooperative coroutines
//!
//! Each coroutine runs on its own fixed-size stack and gives up the CPU only
//! by suspending itself. A [`Scheduler`] owns the coroutines and acts as the
//! controller: [`Scheduler::resume`] switches into a coroutine, which runs
//! until it calls [`Yielder::suspend`], calls [`Yielder::exit`], or returns.
//! Exited coroutines keep their stacks until [`Scheduler::sweep`].
//!
//! # Example
//!
//! ```no_run
//! use mycoroutine::Scheduler;
//!
//! let scheduler = Scheduler::new();
//!
//! let a = scheduler.spawn_named("a", |y| {
//!     println!("a: start");
//!     y.suspend();
//!     println!("a: end");
//! })?;
//! let b = scheduler.spawn_named("b", |y| {
//!     println!("b: start");
//!     y.suspend();
//!     println!("b: end");
//! })?;
//!
//! for co in [a, b, a, b] {
//!     scheduler.resume(co)?;
//! }
//! scheduler.sweep()?;
//! # Ok::<(), mycoroutine::Error>(())
//! ```

pub mod arch;
pub mod config;
pub mod coroutine;
pub mod error;
pub mod scheduler;
pub mod stack;

pub use config::{Config, DEFAULT_STACK_SIZE, MIN_STACK_SIZE};
pub use coroutine::{CoroutineId, Entry, State, UNNAMED, Yielder};
pub use error::{Error, Result};
pub use scheduler::Scheduler;
