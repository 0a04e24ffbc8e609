//! Coroutine control blocks and the code every coroutine starts in.

use crate::arch::Context;
use crate::scheduler::Inner;
use crate::stack::Stack;
use std::cell::Cell;
use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::ptr::{self, NonNull};

/// Name given to coroutines created without one
pub const UNNAMED: &str = "unnamed";

/// Function a coroutine runs on its first resume.
///
/// Receives the coroutine's `Yielder` and the opaque argument given to
/// `Scheduler::create`.
pub type Entry = fn(&Yielder<'_>, *mut c_void);

/// Handle to a coroutine owned by a `Scheduler`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoroutineId(pub(crate) u64);

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a coroutine. Reclaimed coroutines no longer exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created; its saved context is the synthetic first-run frame
    NotStarted,
    Running,
    Suspended,
    /// Waiting in the exited set for a sweep
    Exited,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::NotStarted => "not started",
            State::Running => "running",
            State::Suspended => "suspended",
            State::Exited => "exited",
        })
    }
}

/// Coroutine control block
///
/// Heap allocated so its address stays fixed; the first-run frame on
/// `stack` points back at it.
pub(crate) struct Coroutine {
    pub(crate) id: CoroutineId,
    pub(crate) name: String,
    entry: Entry,
    arg: *mut c_void,
    /// Releases `arg` if the coroutine is reclaimed before it starts
    drop_arg: Cell<Option<unsafe fn(*mut c_void)>>,
    pub(crate) state: Cell<State>,
    /// Where the saved registers live on `stack` while not running
    pub(crate) context: Cell<*mut Context>,
    scheduler: *const Inner,
    stack: Stack,
}

impl Coroutine {
    /// Allocate a control block and shape the top of `stack` into its
    /// first-run frame.
    ///
    /// The block is released with `Coroutine::free`.
    pub(crate) fn alloc(
        id: CoroutineId,
        name: String,
        entry: Entry,
        arg: *mut c_void,
        drop_arg: Option<unsafe fn(*mut c_void)>,
        scheduler: *const Inner,
        stack: Stack,
    ) -> NonNull<Coroutine> {
        let co = NonNull::from(Box::leak(Box::new(Coroutine {
            id,
            name,
            entry,
            arg,
            drop_arg: Cell::new(drop_arg),
            state: Cell::new(State::NotStarted),
            context: Cell::new(ptr::null_mut()),
            scheduler,
            stack,
        })));

        let this = unsafe { co.as_ref() };
        let context = unsafe { Context::install(this.stack.top(), bootstrap, co.as_ptr().cast()) };
        this.context.set(context);
        co
    }

    /// Release a control block and its stack.
    ///
    /// # Safety
    /// `co` must come from `Coroutine::alloc`, must not be running, and no
    /// reference to it may outlive this call.
    pub(crate) unsafe fn free(co: NonNull<Coroutine>) {
        drop(unsafe { Box::from_raw(co.as_ptr()) });
    }

    pub(crate) fn stack_len(&self) -> usize {
        self.stack.len()
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        if let Some(drop_arg) = self.drop_arg.take() {
            unsafe { drop_arg(self.arg) };
        }
    }
}

/// Called by the trampoline on a coroutine's first resume.
///
/// Runs the entry function, then the exit path. A panic may not unwind
/// into the trampoline, so it aborts the process instead.
unsafe extern "C" fn bootstrap(data: *mut u8) -> ! {
    let co = unsafe { &*data.cast::<Coroutine>() };
    let scheduler = unsafe { &*co.scheduler };

    // From here on the entry owns the argument
    co.drop_arg.set(None);

    let yielder = Yielder { co, scheduler };
    let result = panic::catch_unwind(AssertUnwindSafe(|| (co.entry)(&yielder, co.arg)));
    if result.is_err() {
        log::error!("coroutine {} ({}) panicked; aborting", co.id, co.name);
        process::abort();
    }

    scheduler.exit(co)
}

/// A running coroutine's link back to its controller.
///
/// Only handed to coroutine bodies, so yielding can only happen from
/// inside a coroutine.
pub struct Yielder<'a> {
    co: &'a Coroutine,
    scheduler: &'a Inner,
}

impl Yielder<'_> {
    pub fn id(&self) -> CoroutineId {
        self.co.id
    }

    pub fn name(&self) -> &str {
        &self.co.name
    }

    /// Suspend this coroutine and switch back to the controller.
    ///
    /// Returns when the controller resumes this coroutine again.
    pub fn suspend(&self) {
        self.scheduler.suspend(self.co);
    }

    /// Finish this coroutine now.
    ///
    /// Nothing on the coroutine's stack is dropped; values still alive in
    /// the body leak. Returning from the body is the clean way to exit.
    pub fn exit(&self) -> ! {
        self.scheduler.exit(self.co)
    }
}

impl fmt::Debug for Yielder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Yielder")
            .field("id", &self.co.id)
            .field("name", &self.co.name)
            .finish()
    }
}
