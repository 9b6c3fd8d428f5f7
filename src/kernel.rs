use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::error::ProvisionError;

/// Virtual memory page size of the computer. This is usually 4096.
/// We can't know it at compile time, so it is asked once and cached here.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// This trait provides an abstraction over the low level memory operations
/// and syscalls the allocator is built on. The allocator's view of memory has
/// nothing to do with the concrete APIs offered by each kernel, and tests
/// plug in a simulated heap through it.
pub trait PlatformMemory {
    /// Moves the program break up by `increment` bytes and returns the
    /// previous break. An `increment` of zero just reports the current break.
    ///
    /// # Safety
    ///
    /// The caller takes ownership of the returned `increment` bytes.
    unsafe fn extend_break(&mut self, increment: usize) -> Result<NonNull<u8>, ProvisionError>;

    /// Requests a private, zero-filled, read-write region of `len` bytes.
    ///
    /// # Safety
    ///
    /// The region must eventually be handed back through [`PlatformMemory::unmap`] only.
    unsafe fn map(&mut self, len: usize) -> Result<NonNull<u8>, ProvisionError>;

    /// Returns the region of `len` bytes starting at `addr` to the kernel.
    ///
    /// # Safety
    ///
    /// `addr` and `len` must describe exactly one region obtained from [`PlatformMemory::map`].
    unsafe fn unmap(&mut self, addr: NonNull<u8>, len: usize) -> Result<(), ProvisionError>;

    /// Returns the virtual memory page size of the computer in bytes.
    fn page_size(&self) -> usize;
}

/// The operating system, as seen by the allocator.
///
/// On unix the program break is the real one, driven through `sbrk`. Windows
/// has no such thing, so there the break is emulated on top of one large
/// reservation that gets committed page by page as it advances.
pub struct Kernel {
    #[cfg(windows)]
    reservation: win32::Reservation,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            #[cfg(windows)]
            reservation: win32::Reservation::new(),
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper to calculate the computer's page size.
#[inline]
pub(crate) fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = system_page_size();
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

#[cfg(unix)]
fn system_page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
}

#[cfg(windows)]
fn system_page_size() -> usize {
    win32::page_size()
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};
    use crate::error::ProvisionError;

    use libc::{intptr_t, mmap, munmap, off_t, sbrk, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn extend_break(&mut self, increment: usize) -> Result<NonNull<u8>, ProvisionError> {
            let exhausted = ProvisionError::BreakExhausted { requested: increment };
            let increment = intptr_t::try_from(increment).map_err(|_| exhausted)?;

            let prev = unsafe { sbrk(increment) };

            // sbrk reports failure as (void *) -1.
            if prev as isize == -1 {
                return Err(exhausted);
            }

            NonNull::new(prev.cast::<u8>()).ok_or(exhausted)
        }

        unsafe fn map(&mut self, len: usize) -> Result<NonNull<u8>, ProvisionError> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            let addr = unsafe { mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET) };

            match addr {
                libc::MAP_FAILED => Err(ProvisionError::MapFailed { len }),
                addr => NonNull::new(addr.cast::<u8>()).ok_or(ProvisionError::MapFailed { len }),
            }
        }

        unsafe fn unmap(&mut self, addr: NonNull<u8>, len: usize) -> Result<(), ProvisionError> {
            match unsafe { munmap(addr.as_ptr().cast::<c_void>(), len as size_t) } {
                0 => Ok(()),
                _ => Err(ProvisionError::UnmapFailed {
                    addr: addr.as_ptr() as usize,
                    len,
                }),
            }
        }

        fn page_size(&self) -> usize {
            super::page_size()
        }
    }
}

#[cfg(windows)]
mod win32 {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::{Kernel, PlatformMemory};
    use crate::{error::ProvisionError, utils::align};

    use windows::Win32::System::{Memory, SystemInformation};

    /// Address space set aside for the emulated program break.
    const RESERVATION_SIZE: usize = 1 << 30;

    /// Emulated program break: `brk` bytes of `base` are handed out and
    /// `committed` bytes are backed by memory.
    pub(super) struct Reservation {
        base: *mut u8,
        brk: usize,
        committed: usize,
    }

    // The reservation is owned by exactly one `Kernel`.
    unsafe impl Send for Reservation {}

    impl Reservation {
        pub(super) const fn new() -> Self {
            Self {
                base: std::ptr::null_mut(),
                brk: 0,
                committed: 0,
            }
        }
    }

    pub(super) fn page_size() -> usize {
        unsafe {
            let mut system_info = MaybeUninit::uninit();
            SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

            system_info.assume_init().dwPageSize as usize
        }
    }

    impl PlatformMemory for Kernel {
        unsafe fn extend_break(&mut self, increment: usize) -> Result<NonNull<u8>, ProvisionError> {
            let exhausted = ProvisionError::BreakExhausted { requested: increment };
            let reservation = &mut self.reservation;

            if reservation.base.is_null() {
                let base = unsafe {
                    Memory::VirtualAlloc(
                        None,
                        RESERVATION_SIZE,
                        Memory::MEM_RESERVE,
                        Memory::PAGE_NOACCESS,
                    )
                };
                if base.is_null() {
                    return Err(exhausted);
                }
                reservation.base = base.cast();
            }

            let new_brk = reservation
                .brk
                .checked_add(increment)
                .filter(|&brk| brk <= RESERVATION_SIZE)
                .ok_or(exhausted)?;

            if new_brk > reservation.committed {
                let target = align(new_brk, super::page_size())
                    .ok_or(exhausted)?
                    .min(RESERVATION_SIZE);

                let addr = unsafe {
                    Memory::VirtualAlloc(
                        Some(reservation.base.add(reservation.committed) as *const c_void),
                        target - reservation.committed,
                        Memory::MEM_COMMIT,
                        Memory::PAGE_READWRITE,
                    )
                };
                if addr.is_null() {
                    return Err(exhausted);
                }
                reservation.committed = target;
            }

            let prev = unsafe { reservation.base.add(reservation.brk) };
            reservation.brk = new_brk;

            NonNull::new(prev).ok_or(exhausted)
        }

        unsafe fn map(&mut self, len: usize) -> Result<NonNull<u8>, ProvisionError> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            let addr = unsafe { Memory::VirtualAlloc(None, len, flags, protection) };

            NonNull::new(addr.cast()).ok_or(ProvisionError::MapFailed { len })
        }

        unsafe fn unmap(&mut self, addr: NonNull<u8>, len: usize) -> Result<(), ProvisionError> {
            unsafe { Memory::VirtualFree(addr.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE) }
                .map_err(|_| ProvisionError::UnmapFailed {
                    addr: addr.as_ptr() as usize,
                    len,
                })
        }

        fn page_size(&self) -> usize {
            super::page_size()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn page_size_is_cached_power_of_two() {
        let size = page_size();

        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
        assert_eq!(size, Kernel::new().page_size());
    }

    #[test]
    fn mapped_region_is_zeroed_and_writable() {
        let mut kernel = Kernel::new();
        let len = 3 * page_size();

        unsafe {
            let addr = kernel.map(len).unwrap();
            let bytes = std::slice::from_raw_parts_mut(addr.as_ptr(), len);

            assert!(bytes.iter().all(|&b| b == 0));
            bytes.fill(0xAB);
            assert_eq!(bytes[len - 1], 0xAB);

            kernel.unmap(addr, len).unwrap();
        }
    }

    #[test]
    fn break_query_does_not_move_it() {
        let mut kernel = Kernel::new();

        unsafe {
            let first = kernel.extend_break(0).unwrap();
            assert!(first.as_ptr() as usize > 0);
        }
    }
}
