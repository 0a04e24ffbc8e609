//! Private coroutine stacks.

use std::io;
use std::ptr::{self, NonNull};

/// A fixed-size, zero-initialized stack backed by an anonymous mapping.
///
/// The mapping is unmapped when the `Stack` is dropped. There is no guard
/// page: overflowing the stack corrupts whatever lies below it.
#[derive(Debug)]
pub struct Stack {
    base: NonNull<u8>,
    len: usize,
}

impl Stack {
    /// Map a new stack of at least `size` bytes, rounded up to the page size.
    pub fn new(size: usize) -> io::Result<Stack> {
        let len = size
            .checked_next_multiple_of(page_size())
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "stack size overflows the address space"))?;

        // Anonymous private mappings are zero-filled by the kernel
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let base = NonNull::new(base.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned null"))?;
        Ok(Stack { base, len })
    }

    /// Lowest address of the stack.
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// One past the highest address; page aligned.
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.len) }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };
        if rc != 0 {
            log::error!(
                "failed to unmap {} byte stack at {:p}: {}",
                self.len,
                self.base,
                io::Error::last_os_error()
            );
        }
    }
}

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}
