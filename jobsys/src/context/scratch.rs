//! Thread-local scratch buffers lent to job groups.
//!
//! Each thread keeps a small free-list of byte buffers. A group that asks for
//! scratch memory leases one for the duration of its sequential loop and hands
//! it back afterwards. Buffers only ever grow and are freed when the thread
//! exits. A group executing nested inside another group on the same thread
//! (a task that waits and helps run other jobs) leases a different buffer, so
//! scratch memory is never aliased.

use std::cell::RefCell;
use std::mem;

thread_local! {
    static SCRATCH: RefCell<Vec<Vec<u8>>> = const { RefCell::new(Vec::new()) };
}

/// Runs `f` with `size` bytes of scratch memory, or `None` when `size == 0`.
///
/// The bytes are not cleared: they hold whatever the previous lessee of the
/// buffer wrote, or zeroes if the buffer just grew.
pub(crate) fn with_scratch<F, R>(size: usize, f: F) -> R
where
    F: FnOnce(Option<&mut [u8]>) -> R,
{
    if size == 0 {
        return f(None);
    }

    let mut lease = Lease::acquire(size);
    f(Some(lease.as_mut_slice()))
}

struct Lease {
    buf: Vec<u8>,
    size: usize,
}

impl Lease {
    fn acquire(size: usize) -> Self {
        let mut buf = SCRATCH
            .try_with(|pool| pool.borrow_mut().pop())
            .ok()
            .flatten()
            .unwrap_or_default();

        if buf.len() < size {
            buf.resize(size, 0);
        }

        Self { buf, size }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[..self.size]
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let buf = mem::take(&mut self.buf);
        // Thread is tearing down, let the buffer go.
        let _ = SCRATCH.try_with(|pool| pool.borrow_mut().push(buf));
    }
}

#[cfg(test)]
pub(crate) fn pooled_buffers() -> usize {
    SCRATCH.with_borrow(|pool| pool.len())
}
