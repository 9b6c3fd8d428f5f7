//! Simulated memory for the allocator's own tests.

use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

use crate::{error::ProvisionError, kernel::PlatformMemory};

const PAGE: usize = 4096;

/// A fake program break over a fixed, page-aligned buffer, plus mappings
/// served by the system allocator. Counts every call so tests can tell
/// whether the arena grew.
pub(crate) struct ToyHeap {
    buffer: NonNull<u8>,
    capacity: usize,
    brk: usize,
    /// Calls to [`PlatformMemory::extend_break`] that actually moved the break.
    pub break_calls: usize,
    pub map_calls: usize,
    pub unmap_calls: usize,
    /// Live mappings as `(addr, len)`.
    pub mappings: Vec<(usize, usize)>,
    /// Bytes a second break user grabs right before our next real growth.
    pub interference: usize,
}

// The buffer and every mapping belong to this value alone.
unsafe impl Send for ToyHeap {}

impl ToyHeap {
    pub fn new(capacity: usize) -> Self {
        let layout = Layout::from_size_align(capacity, PAGE).unwrap();
        let buffer = NonNull::new(unsafe { alloc::alloc(layout) }).unwrap();

        Self {
            buffer,
            capacity,
            brk: 0,
            break_calls: 0,
            map_calls: 0,
            unmap_calls: 0,
            mappings: Vec::new(),
            interference: 0,
        }
    }

    /// Bytes handed out through the break so far.
    pub fn arena_size(&self) -> usize {
        self.brk
    }

    pub fn break_addr(&self) -> usize {
        self.buffer.as_ptr() as usize + self.brk
    }

    /// Moves the break behind the allocator's back, like a second allocator would.
    pub fn steal(&mut self, bytes: usize) {
        assert!(self.brk + bytes <= self.capacity);
        self.brk += bytes;
    }
}

impl PlatformMemory for ToyHeap {
    unsafe fn extend_break(&mut self, increment: usize) -> Result<NonNull<u8>, ProvisionError> {
        if increment > 0 {
            let foreign = std::mem::take(&mut self.interference);
            self.steal(foreign);
        }

        if self.brk + increment > self.capacity {
            return Err(ProvisionError::BreakExhausted { requested: increment });
        }

        let prev = unsafe { self.buffer.add(self.brk) };
        self.brk += increment;
        if increment > 0 {
            self.break_calls += 1;
        }

        Ok(prev)
    }

    unsafe fn map(&mut self, len: usize) -> Result<NonNull<u8>, ProvisionError> {
        let layout = Layout::from_size_align(len, PAGE).map_err(|_| ProvisionError::MapFailed { len })?;
        let addr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .ok_or(ProvisionError::MapFailed { len })?;

        self.map_calls += 1;
        self.mappings.push((addr.as_ptr() as usize, len));

        Ok(addr)
    }

    unsafe fn unmap(&mut self, addr: NonNull<u8>, len: usize) -> Result<(), ProvisionError> {
        let addr = addr.as_ptr() as usize;
        let index = self
            .mappings
            .iter()
            .position(|&mapping| mapping == (addr, len))
            .ok_or(ProvisionError::UnmapFailed { addr, len })?;

        self.mappings.swap_remove(index);
        self.unmap_calls += 1;

        unsafe { alloc::dealloc(addr as *mut u8, Layout::from_size_align_unchecked(len, PAGE)) };
        Ok(())
    }

    fn page_size(&self) -> usize {
        PAGE
    }
}

impl Drop for ToyHeap {
    fn drop(&mut self) {
        unsafe {
            for &(addr, len) in &self.mappings {
                alloc::dealloc(addr as *mut u8, Layout::from_size_align_unchecked(len, PAGE));
            }
            alloc::dealloc(
                self.buffer.as_ptr(),
                Layout::from_size_align_unchecked(self.capacity, PAGE),
            );
        }
    }
}
