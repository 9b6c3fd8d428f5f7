use std::ptr::NonNull;

use log::debug;

use crate::{
    block::{BLOCK_HEADER_SIZE, Block, Status},
    error::ProvisionError,
    heap::Heap,
    kernel::PlatformMemory,
    utils::{ALIGNMENT, align, padding},
};

/// Large requests don't go through the arena at all. Each one gets its own
/// anonymous mapping, which goes straight back to the kernel on release:
///
/// ```text
///   arena (program break)                 mappings
/// +-------+-------+-------+---->     +--------+----------------------+
/// | Block | Block | Block |          | Mapped |    large payload     |
/// +-------+-------+-------+---->     +--------+----------------------+
/// ```
///
/// Mapped blocks are never linked into the arena list.
impl<P: PlatformMemory> Heap<P> {
    /// Maps a standalone block of exactly `size` bytes, header included.
    pub(crate) fn map_block(&mut self, size: usize) -> Result<NonNull<Block>, ProvisionError> {
        unsafe {
            let addr = self.memory.map(size)?;
            let block = Block::init(addr, size, Status::Mapped);

            debug!("[brkalloc] mapped {size} bytes at {addr:p}");
            Ok(block)
        }
    }

    /// Maps a block whose payload starts at a multiple of `align`.
    ///
    /// The header is pushed forward inside the mapping until the payload
    /// lands on the alignment, and the distance from the mapping start is
    /// recorded in [`Block::lead`] so the whole mapping can be released.
    /// Returns `Ok(None)` when the request cannot be described at all.
    pub(crate) fn map_aligned_block(
        &mut self,
        size: usize,
        align_to: usize,
    ) -> Result<Option<NonNull<Block>>, ProvisionError> {
        debug_assert!(align_to.is_power_of_two() && align_to > ALIGNMENT);

        let Some(len) = size
            .checked_add(BLOCK_HEADER_SIZE + align_to)
            .and_then(|len| align(len, ALIGNMENT))
        else {
            return Ok(None);
        };

        unsafe {
            let base = self.memory.map(len)?;
            let lead = padding(base.as_ptr() as usize + BLOCK_HEADER_SIZE, align_to);

            let Ok(lead_field) = u32::try_from(lead) else {
                self.memory.unmap(base, len)?;
                return Ok(None);
            };

            let mut block = Block::init(base.add(lead), len - lead, Status::Mapped);
            block.as_mut().lead = lead_field;

            debug!("[brkalloc] mapped {len} bytes at {base:p} aligned to {align_to}");
            Ok(Some(block))
        }
    }

    /// Returns the whole mapping behind `block` to the kernel. The header is
    /// gone afterwards.
    ///
    /// **SAFETY**: `block` must be a live [`Status::Mapped`] block.
    pub(crate) unsafe fn unmap_block(&mut self, block: NonNull<Block>) -> Result<(), ProvisionError> {
        unsafe {
            debug_assert_eq!(block.as_ref().status, Status::Mapped);

            let lead = block.as_ref().lead as usize;
            let len = block.as_ref().size + lead;
            let base = block.cast::<u8>().sub(lead);

            self.memory.unmap(base, len)?;

            debug!("[brkalloc] unmapped {len} bytes at {base:p}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        block::{BLOCK_HEADER_SIZE, Block, Status},
        heap::Heap,
        testing::ToyHeap,
    };

    use test_log::test;

    #[test]
    fn mapped_block_bypasses_the_arena() {
        let mut heap = Heap::new(ToyHeap::new(1 << 20));

        let block = heap.map_block(200 * 1024).unwrap();

        unsafe {
            assert_eq!(block.as_ref().status, Status::Mapped);
            assert_eq!(block.as_ref().size, 200 * 1024);
            assert!(block.as_ref().next.is_none());
        }
        assert!(heap.blocks.is_empty());
        assert_eq!(heap.memory().arena_size(), 0);

        unsafe { heap.unmap_block(block).unwrap() };
        assert!(heap.memory().mappings.is_empty());
    }

    #[test]
    fn aligned_block_payload_honours_alignment() {
        let mut heap = Heap::new(ToyHeap::new(1 << 20));

        for align in [16, 64, 4096, 8192] {
            let block = heap.map_aligned_block(100, align).unwrap().unwrap();
            let payload = Block::payload(block);

            assert_eq!(payload.as_ptr() as usize % align, 0);
            unsafe {
                assert!(block.as_ref().usable() >= 100);
                heap.unmap_block(block).unwrap();
            }
        }

        assert!(heap.memory().mappings.is_empty());
        assert_eq!(heap.memory().unmap_calls, 4);
    }

    #[test]
    fn unaligned_mapping_records_its_lead() {
        let mut heap = Heap::new(ToyHeap::new(1 << 20));

        // Toy mappings are page aligned, so the header has to move up.
        let block = heap.map_aligned_block(64, 4096).unwrap().unwrap();

        unsafe {
            assert_eq!(block.as_ref().lead as usize, 4096 - BLOCK_HEADER_SIZE);
            heap.unmap_block(block).unwrap();
        }
    }
}
