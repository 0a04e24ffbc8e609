//! Scheduler configuration.

use crate::error::{Error, Result};

/// Stack size for each coroutine (4MiB)
pub const DEFAULT_STACK_SIZE: usize = 4 * 1024 * 1024;

/// Smallest stack a coroutine may be given (16KiB)
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Settings shared by every coroutine of a `Scheduler`.
///
/// ```
/// use mycoroutine::Config;
///
/// let config = Config::new().with_stack_size(256 * 1024);
/// assert_eq!(config.stack_size(), 256 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    stack_size: usize,
}

impl Config {
    pub fn new() -> Self {
        Config {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Set the size of each coroutine stack. Rounded up to the page size
    /// when stacks are allocated.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(Error::StackTooSmall {
                size: self.stack_size,
                min: MIN_STACK_SIZE,
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
