//! Errors reported at the scheduler boundary.

use crate::coroutine::{CoroutineId, State};
use std::io;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("coroutine {0} was never created by this scheduler")]
    Unknown(CoroutineId),

    #[error("coroutine {0} has already been reclaimed")]
    Reclaimed(CoroutineId),

    #[error("cannot {op} coroutine {id}: it is {state}")]
    InvalidState {
        op: &'static str,
        id: CoroutineId,
        state: State,
    },

    #[error("cannot {op} while coroutine {running} is running; only the controller may")]
    NotController {
        op: &'static str,
        running: CoroutineId,
    },

    #[error("stack size {size} is below the minimum of {min} bytes")]
    StackTooSmall { size: usize, min: usize },

    #[error("failed to allocate a {size} byte coroutine stack")]
    StackAlloc {
        size: usize,
        #[source]
        source: io::Error,
    },
}
