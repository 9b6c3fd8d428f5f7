use std::ptr::NonNull;

use crate::{
    block::{Block, MIN_BLOCK_SIZE, Status},
    list::BlockList,
};

impl BlockList {
    /// Shrinks `block` to `size` bytes and turns what is left into a new free
    /// block linked right after it.
    ///
    /// ```text
    /// +--------+---------------------------+      +--------+-------+-------------+
    /// | header |          payload          |  ->  | header |       | header free |
    /// +--------+---------------------------+      +--------+-------+-------------+
    ///                                             <---- size ----->
    /// ```
    ///
    /// Nothing happens when the remainder could not hold a header plus 8
    /// usable bytes: those bytes simply stay with `block`. Returns whether the
    /// block was split.
    ///
    /// **SAFETY**: `block` must be linked in this list, `block.size >= size`
    /// and `size` must be a valid aligned block size.
    pub(crate) unsafe fn split(&mut self, mut block: NonNull<Block>, size: usize) -> bool {
        unsafe {
            debug_assert!(block.as_ref().size >= size);

            let remainder = block.as_ref().size - size;
            if remainder < MIN_BLOCK_SIZE {
                return false;
            }

            let free = Block::init(block.cast::<u8>().add(size), remainder, Status::Free);

            block.as_mut().size = size;
            self.insert_after(block, free);
        }

        true
    }

    /// Gives the first `lead` bytes of `block` away as a free block and
    /// returns the header of what is left, which keeps `block`'s status.
    ///
    /// ```text
    /// +--------+---------------------------+      +-------------+--------+-------------+
    /// | header |          payload          |  ->  | header free | header |   payload   |
    /// +--------+---------------------------+      +-------------+--------+-------------+
    ///                                             <--- lead ---->
    /// ```
    ///
    /// **SAFETY**: `block` must be linked in this list, `lead` must be an
    /// aligned size of at least [`MIN_BLOCK_SIZE`] and `block.size - lead`
    /// must be a valid block size too.
    pub(crate) unsafe fn split_front(&mut self, mut block: NonNull<Block>, lead: usize) -> NonNull<Block> {
        unsafe {
            debug_assert!(lead >= MIN_BLOCK_SIZE);
            debug_assert!(block.as_ref().size >= lead + MIN_BLOCK_SIZE);

            let rest = Block::init(
                block.cast::<u8>().add(lead),
                block.as_ref().size - lead,
                block.as_ref().status,
            );

            block.as_mut().size = lead;
            block.as_mut().status = Status::Free;
            self.insert_after(block, rest);

            rest
        }
    }
}
