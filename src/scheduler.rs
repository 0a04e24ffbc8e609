//! Lifecycle manager: create, resume, yield, exit and sweep.
//!
//! # Example
//!
//! ```no_run
//! use mycoroutine::{Scheduler, State};
//!
//! let scheduler = Scheduler::new();
//! let co = scheduler.spawn(|y| {
//!     println!("co: start");
//!     y.suspend();
//!     println!("co: end");
//! })?;
//!
//! assert_eq!(scheduler.resume(co)?, State::Suspended);
//! assert_eq!(scheduler.resume(co)?, State::Exited);
//! scheduler.sweep()?;
//! # Ok::<(), mycoroutine::Error>(())
//! ```

use crate::arch::{Context, context_switch};
use crate::config::Config;
use crate::coroutine::{Coroutine, CoroutineId, Entry, State, UNNAMED, Yielder};
use crate::error::{Error, Result};
use crate::stack::Stack;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::ptr::{self, NonNull};
use std::rc::Rc;

/// Owns a set of coroutines and the controller context that drives them.
///
/// A scheduler lives on one thread. Coroutines only run inside `resume`,
/// one at a time, and every suspension returns control to the caller of
/// `resume`.
pub struct Scheduler {
    inner: Rc<Inner>,
}

/// State reachable from running coroutines through their `Yielder`
pub(crate) struct Inner {
    config: Config,
    /// Controller's saved context while a coroutine runs
    main: Cell<*mut Context>,
    /// Running coroutine; `None` while the controller runs
    current: Cell<Option<NonNull<Coroutine>>>,
    coroutines: RefCell<HashMap<CoroutineId, NonNull<Coroutine>>>,
    /// Exited coroutines waiting for `sweep`
    exited: RefCell<Vec<CoroutineId>>,
    next_id: Cell<u64>,
}

impl Scheduler {
    /// Create a scheduler with the default configuration.
    pub fn new() -> Self {
        Scheduler {
            inner: Rc::new(Inner::new(Config::default())),
        }
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Scheduler {
            inner: Rc::new(Inner::new(config)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Create a coroutine that will run `entry(yielder, arg)` on its first
    /// resume. `name` is only used in diagnostics.
    ///
    /// The coroutine does not run until it is resumed.
    pub fn create(&self, entry: Entry, arg: *mut c_void, name: Option<&str>) -> Result<CoroutineId> {
        self.insert(entry, arg, None, name.unwrap_or(UNNAMED))
    }

    /// Create a coroutine running a closure.
    pub fn spawn<F>(&self, f: F) -> Result<CoroutineId>
    where
        F: FnOnce(&Yielder<'_>) + 'static,
    {
        self.spawn_named(UNNAMED, f)
    }

    pub fn spawn_named<F>(&self, name: &str, f: F) -> Result<CoroutineId>
    where
        F: FnOnce(&Yielder<'_>) + 'static,
    {
        let arg = Box::into_raw(Box::new(f)).cast::<c_void>();
        self.insert(closure_entry::<F>, arg, Some(drop_closure::<F>), name)
    }

    fn insert(
        &self,
        entry: Entry,
        arg: *mut c_void,
        drop_arg: Option<unsafe fn(*mut c_void)>,
        name: &str,
    ) -> Result<CoroutineId> {
        let size = self.inner.config.stack_size();
        let stack = match Stack::new(size) {
            Ok(stack) => stack,
            Err(source) => {
                if let Some(drop_arg) = drop_arg {
                    unsafe { drop_arg(arg) };
                }
                return Err(Error::StackAlloc { size, source });
            }
        };

        let id = CoroutineId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        let co = Coroutine::alloc(
            id,
            name.to_owned(),
            entry,
            arg,
            drop_arg,
            Rc::as_ptr(&self.inner),
            stack,
        );
        log::debug!(
            "created coroutine {} ({}) with a {} byte stack",
            id,
            name,
            unsafe { co.as_ref() }.stack_len()
        );

        self.inner.coroutines.borrow_mut().insert(id, co);
        Ok(id)
    }

    /// Run a coroutine until it next suspends or exits.
    ///
    /// Returns the coroutine's state afterwards: `Suspended` or `Exited`.
    pub fn resume(&self, id: CoroutineId) -> Result<State> {
        let inner = &*self.inner;
        inner.check_controller("resume")?;

        let co = inner.lookup(id)?;
        let co = unsafe { co.as_ref() };
        match co.state.get() {
            State::NotStarted | State::Suspended => {}
            state => {
                return Err(Error::InvalidState {
                    op: "resume",
                    id,
                    state,
                });
            }
        }

        log::trace!("switching to coroutine {} ({})", co.id, co.name);
        co.state.set(State::Running);
        inner.current.set(Some(NonNull::from(co)));

        unsafe { context_switch(inner.main.as_ptr(), co.context.get()) };

        // Back on the controller: the coroutine yielded or exited
        inner.current.set(None);
        log::trace!("coroutine {} ({}) is {}", co.id, co.name, co.state.get());
        Ok(co.state.get())
    }

    /// Move a coroutine that never ran straight to the exited set.
    ///
    /// Its entry function will not be called; the next `sweep` frees it.
    pub fn retire(&self, id: CoroutineId) -> Result<()> {
        let inner = &*self.inner;
        inner.check_controller("retire")?;

        let co = unsafe { inner.lookup(id)?.as_ref() };
        match co.state.get() {
            State::NotStarted => {}
            state => {
                return Err(Error::InvalidState {
                    op: "retire",
                    id,
                    state,
                });
            }
        }

        co.state.set(State::Exited);
        inner.exited.borrow_mut().push(id);
        log::debug!("retired coroutine {} ({}) before it started", id, co.name);
        Ok(())
    }

    /// Free the stacks of every exited coroutine.
    ///
    /// Returns how many coroutines were reclaimed. Their ids become invalid.
    pub fn sweep(&self) -> Result<usize> {
        let inner = &*self.inner;
        inner.check_controller("sweep")?;

        let exited = inner.exited.take();
        // Unlink first: freeing drops unstarted closures, which may call back in
        let reclaimed: Vec<_> = {
            let mut coroutines = inner.coroutines.borrow_mut();
            exited.iter().filter_map(|id| coroutines.remove(id)).collect()
        };
        for &co in &reclaimed {
            let this = unsafe { co.as_ref() };
            log::debug!("reclaiming coroutine {} ({})", this.id, this.name);
            unsafe { Coroutine::free(co) };
        }
        Ok(reclaimed.len())
    }

    pub fn state(&self, id: CoroutineId) -> Result<State> {
        let co = self.inner.lookup(id)?;
        Ok(unsafe { co.as_ref() }.state.get())
    }

    pub fn name(&self, id: CoroutineId) -> Result<String> {
        let co = self.inner.lookup(id)?;
        Ok(unsafe { co.as_ref() }.name.clone())
    }

    /// The running coroutine, or `None` when called from the controller.
    pub fn current(&self) -> Option<CoroutineId> {
        self.inner
            .current
            .get()
            .map(|co| unsafe { co.as_ref() }.id)
    }

    /// Coroutines that have exited and not yet been swept.
    pub fn exited(&self) -> Vec<CoroutineId> {
        self.inner.exited.borrow().clone()
    }

    /// Number of coroutines not yet reclaimed, exited ones included.
    pub fn len(&self) -> usize {
        self.inner.coroutines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("coroutines", &self.len())
            .field("exited", &self.inner.exited.borrow())
            .field("current", &self.current())
            .finish()
    }
}

impl Inner {
    fn new(config: Config) -> Self {
        Inner {
            config,
            main: Cell::new(ptr::null_mut()),
            current: Cell::new(None),
            coroutines: RefCell::new(HashMap::new()),
            exited: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    fn check_controller(&self, op: &'static str) -> Result<()> {
        match self.current.get() {
            None => Ok(()),
            Some(co) => Err(Error::NotController {
                op,
                running: unsafe { co.as_ref() }.id,
            }),
        }
    }

    fn lookup(&self, id: CoroutineId) -> Result<NonNull<Coroutine>> {
        match self.coroutines.borrow().get(&id) {
            Some(&co) => Ok(co),
            None if id.0 < self.next_id.get() => Err(Error::Reclaimed(id)),
            None => Err(Error::Unknown(id)),
        }
    }

    /// Switch from the running coroutine back to the controller.
    pub(crate) fn suspend(&self, co: &Coroutine) {
        debug_assert_eq!(self.current.get(), Some(NonNull::from(co)));
        co.state.set(State::Suspended);
        unsafe { context_switch(co.context.as_ptr(), self.main.get()) };
    }

    /// Final switch of a coroutine: record it as exited and leave its
    /// stack for `sweep`.
    pub(crate) fn exit(&self, co: &Coroutine) -> ! {
        debug_assert_eq!(self.current.get(), Some(NonNull::from(co)));
        co.state.set(State::Exited);
        self.exited.borrow_mut().push(co.id);
        log::debug!("coroutine {} ({}) exited", co.id, co.name);

        unsafe { context_switch(co.context.as_ptr(), self.main.get()) };
        unreachable!("exited coroutine {} was resumed", co.id)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let coroutines = self.coroutines.get_mut();
        let suspended = coroutines
            .values()
            .filter(|co| unsafe { co.as_ref() }.state.get() == State::Suspended)
            .count();
        if suspended > 0 {
            log::warn!(
                "dropping scheduler with {} suspended coroutines; their stacks are freed without unwinding",
                suspended
            );
        }

        for (_, co) in coroutines.drain() {
            unsafe { Coroutine::free(co) };
        }
    }
}

fn closure_entry<F>(yielder: &Yielder<'_>, arg: *mut c_void)
where
    F: FnOnce(&Yielder<'_>) + 'static,
{
    let f = unsafe { Box::from_raw(arg.cast::<F>()) };
    f(yielder);
}

unsafe fn drop_closure<F>(arg: *mut c_void) {
    drop(unsafe { Box::from_raw(arg.cast::<F>()) });
}
