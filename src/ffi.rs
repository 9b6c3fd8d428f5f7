//! C-ABI exports for linking the allocator into non-Rust programs.
//!
//! Gated behind `features = ["ffi"]`. All four entry points share one
//! process-wide [`BrkAlloc`], so they may be called from any thread.

use std::os::raw::c_void;

use crate::global::BrkAlloc;

static HEAP: BrkAlloc = BrkAlloc::new();

/// # Safety
///
/// See [`Heap::allocate`](crate::Heap::allocate).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn brkalloc_malloc(size: usize) -> *mut c_void {
    unsafe { HEAP.allocate(size).cast() }
}

/// # Safety
///
/// See [`Heap::zero_allocate`](crate::Heap::zero_allocate).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn brkalloc_calloc(count: usize, size: usize) -> *mut c_void {
    unsafe { HEAP.zero_allocate(count, size).cast() }
}

/// # Safety
///
/// See [`Heap::release`](crate::Heap::release).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn brkalloc_free(ptr: *mut c_void) {
    unsafe { HEAP.release(ptr.cast()) }
}

/// # Safety
///
/// See [`Heap::resize`](crate::Heap::resize).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn brkalloc_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    unsafe { HEAP.resize(ptr.cast(), size).cast() }
}
