use std::{mem, ptr::NonNull};

use crate::utils::{ALIGNMENT, align};

/// Header size of a block. Payloads start exactly this many bytes after
/// their header, so it has to keep them aligned to [`ALIGNMENT`].
pub(crate) const BLOCK_HEADER_SIZE: usize = mem::size_of::<Block>();

/// Smallest block worth keeping around: a header plus [`ALIGNMENT`] usable bytes.
pub(crate) const MIN_BLOCK_SIZE: usize = BLOCK_HEADER_SIZE + ALIGNMENT;

const _: () = assert!(BLOCK_HEADER_SIZE % ALIGNMENT == 0);

/// Non-null pointer to a block header.
pub(crate) type Link = Option<NonNull<Block>>;

/// Where a block came from and whether it can be handed out.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Part of the arena and available for reuse.
    Free,
    /// Part of the arena and owned by the caller.
    Allocated,
    /// Individually mapped. Never linked into the arena list.
    Mapped,
}

/// This is the structure of a block. The fields of the block are its metadata,
/// content is placed right after this header.
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        |
/// +---------------------+        |
/// |   status  |  lead   |        | -> Header
/// +---------------------+        |
/// |     prev / next     |        |
/// +---------------------+ <------+ <- pointer handed to the user
/// |       Content       |        |
/// |         ...         |        | -> Addressable content
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// `size` always includes the header. `lead` is only used by over-aligned
/// mapped blocks: it is the distance between the start of the mapping and
/// the header, which had to be pushed forward so the payload would satisfy
/// the requested alignment.
#[repr(C, align(8))]
pub(crate) struct Block {
    /// Size of the block, header included.
    pub size: usize,
    /// Current state of the block.
    pub status: Status,
    /// Bytes of the mapping placed before this header.
    pub lead: u32,
    /// Previous block of the arena list.
    pub prev: Link,
    /// Next block of the arena list.
    pub next: Link,
}

/// Total block size for a payload of `size` bytes, or `None` on overflow.
#[inline]
pub(crate) const fn block_size(size: usize) -> Option<usize> {
    match size.checked_add(BLOCK_HEADER_SIZE) {
        Some(total) => align(total, ALIGNMENT),
        None => None,
    }
}

impl Block {
    /// Writes a fresh, unlinked header at `addr`.
    ///
    /// **SAFETY**: `addr` must be valid for writes of `size` bytes and aligned to [`ALIGNMENT`].
    pub unsafe fn init(addr: NonNull<u8>, size: usize, status: Status) -> NonNull<Block> {
        debug_assert_eq!(addr.as_ptr() as usize % ALIGNMENT, 0, "misaligned block header");
        debug_assert!(size >= MIN_BLOCK_SIZE && size % ALIGNMENT == 0, "bad block size {size}");

        let block = addr.cast::<Block>();

        unsafe {
            block.as_ptr().write(Block {
                size,
                status,
                lead: 0,
                prev: None,
                next: None,
            });
        }

        block
    }

    /// Recovers the header of a payload pointer previously handed out.
    ///
    /// **SAFETY**: `payload` must come from [`Block::payload`] and its block must still be alive.
    #[inline]
    pub unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<Block> {
        debug_assert_eq!(payload.as_ptr() as usize % ALIGNMENT, 0, "misaligned payload");

        unsafe { payload.sub(BLOCK_HEADER_SIZE).cast() }
    }

    /// First byte the user is allowed to touch.
    #[inline]
    pub fn payload(block: NonNull<Block>) -> NonNull<u8> {
        // The header and its payload live in the same allocation.
        unsafe { block.cast::<u8>().add(BLOCK_HEADER_SIZE) }
    }

    /// Address one past the last byte of the block.
    #[inline]
    pub fn end(block: NonNull<Block>) -> usize {
        block.as_ptr() as usize + unsafe { block.as_ref().size }
    }

    /// Bytes available to the user.
    #[inline]
    pub fn usable(&self) -> usize {
        self.size - BLOCK_HEADER_SIZE
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.status == Status::Free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn header_keeps_payload_aligned() {
        assert_eq!(BLOCK_HEADER_SIZE % ALIGNMENT, 0);
        assert_eq!(MIN_BLOCK_SIZE, BLOCK_HEADER_SIZE + 8);
    }

    #[test]
    fn block_size_includes_header_and_rounds_up() {
        assert_eq!(Some(BLOCK_HEADER_SIZE + 8), block_size(1));
        assert_eq!(Some(BLOCK_HEADER_SIZE + 8), block_size(8));
        assert_eq!(Some(BLOCK_HEADER_SIZE + 16), block_size(9));
        assert_eq!(None, block_size(usize::MAX - 2));
    }

    #[test]
    fn payload_round_trips_to_header() {
        let mut storage = [0u64; 16];
        let addr = NonNull::new(storage.as_mut_ptr()).unwrap().cast::<u8>();

        unsafe {
            let block = Block::init(addr, 64, Status::Allocated);
            let payload = Block::payload(block);

            assert_eq!(payload.as_ptr() as usize, addr.as_ptr() as usize + BLOCK_HEADER_SIZE);
            assert_eq!(Block::from_payload(payload), block);
            assert_eq!(Block::end(block), addr.as_ptr() as usize + 64);
            assert_eq!(block.as_ref().usable(), 64 - BLOCK_HEADER_SIZE);
            assert!(!block.as_ref().is_free());
        }
    }
}
