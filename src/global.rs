use std::{
    alloc::{GlobalAlloc, Layout},
    ptr,
};

use crate::{
    config::HeapConfig,
    heap::Heap,
    kernel::{Kernel, PlatformMemory},
    utils::ALIGNMENT,
};

/// A [`Heap`] behind a single spin lock, usable as the process allocator.
///
/// The lock is taken once per call and covers the whole operation, since
/// merging, searching and splitting all need a consistent view of the arena.
///
/// ```ignore
/// #[global_allocator]
/// static ALLOCATOR: brkalloc::BrkAlloc = brkalloc::BrkAlloc::new();
/// ```
///
/// Layouts aligned to more than a page are served from their own mapping.
pub struct BrkAlloc<P: PlatformMemory = Kernel> {
    heap: spin::Mutex<Heap<P>>,
}

impl BrkAlloc<Kernel> {
    pub const fn new() -> Self {
        Self::with_config(HeapConfig::DEFAULT)
    }

    /// Panics at compile time when used in a `static` with an invalid `config`.
    pub const fn with_config(config: HeapConfig) -> Self {
        let config = match config.validate() {
            Ok(config) => config,
            Err(_) => panic!("invalid heap configuration"),
        };

        Self::from_heap(Heap::with_valid_config(Kernel::new(), config))
    }
}

impl Default for BrkAlloc<Kernel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PlatformMemory> BrkAlloc<P> {
    pub const fn from_heap(heap: Heap<P>) -> Self {
        Self {
            heap: spin::Mutex::new(heap),
        }
    }

    /// Locked [`Heap::allocate`].
    ///
    /// # Safety
    ///
    /// See [`Heap::allocate`].
    pub unsafe fn allocate(&self, size: usize) -> *mut u8 {
        unsafe { self.heap.lock().allocate(size) }
    }

    /// Locked [`Heap::zero_allocate`].
    ///
    /// # Safety
    ///
    /// See [`Heap::zero_allocate`].
    pub unsafe fn zero_allocate(&self, count: usize, size: usize) -> *mut u8 {
        unsafe { self.heap.lock().zero_allocate(count, size) }
    }

    /// Locked [`Heap::release`].
    ///
    /// # Safety
    ///
    /// See [`Heap::release`].
    pub unsafe fn release(&self, ptr: *mut u8) {
        unsafe { self.heap.lock().release(ptr) }
    }

    /// Locked [`Heap::resize`].
    ///
    /// # Safety
    ///
    /// See [`Heap::resize`].
    pub unsafe fn resize(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        unsafe { self.heap.lock().resize(ptr, size) }
    }
}

unsafe impl<P: PlatformMemory + Send> GlobalAlloc for BrkAlloc<P> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe {
            self.heap
                .lock()
                .allocate_aligned(layout.size(), layout.align())
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() <= ALIGNMENT {
            return unsafe { self.zero_allocate(1, layout.size()) };
        }

        unsafe {
            let ptr = self.alloc(layout);
            if !ptr.is_null() {
                ptr::write_bytes(ptr, 0, layout.size());
            }
            ptr
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.release(ptr) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() <= ALIGNMENT {
            return unsafe { self.resize(ptr, new_size) };
        }

        unsafe {
            let new_layout = Layout::from_size_align_unchecked(new_size, layout.align());
            let new = self.alloc(new_layout);
            if !new.is_null() {
                ptr::copy_nonoverlapping(ptr, new, layout.size().min(new_size));
                self.dealloc(ptr, layout);
            }
            new
        }
    }
}
