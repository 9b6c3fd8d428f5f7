use std::ptr::NonNull;

use crate::{block::Block, list::BlockList};

impl BlockList {
    /// Merges every free block that directly follows `block` into it,
    /// whatever the status of `block` itself.
    ///
    /// Successors are only absorbed while they start exactly where `block`
    /// ends. Somebody else may have moved the program break between two arena
    /// growths, and then list neighbours are not memory neighbours.
    ///
    /// **SAFETY**: `block` must be linked in this list.
    pub(crate) unsafe fn absorb_successors(&mut self, mut block: NonNull<Block>) {
        unsafe {
            while let Some(next) = block.as_ref().next {
                if !next.as_ref().is_free() || Block::end(block) != next.as_ptr() as usize {
                    break;
                }

                block.as_mut().size += next.as_ref().size;
                self.remove(next);
            }
        }
    }

    /// Merges the run of free blocks starting at `block` into one. Does
    /// nothing when `block` itself is not free.
    ///
    /// **SAFETY**: `block` must be linked in this list.
    pub(crate) unsafe fn coalesce_forward(&mut self, block: NonNull<Block>) {
        unsafe {
            if block.as_ref().is_free() {
                self.absorb_successors(block);
            }
        }
    }

    /// Runs [`BlockList::coalesce_forward`] over the whole list, so no two
    /// adjacent free blocks survive.
    pub(crate) fn coalesce_all(&mut self) {
        let mut current = self.first();

        while let Some(block) = current {
            unsafe {
                self.coalesce_forward(block);
                current = block.as_ref().next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;

    use crate::{
        block::{Block, Status},
        list::{BlockList, tests::carve},
    };

    use test_log::test;

    fn set(block: NonNull<Block>, status: Status) {
        unsafe { (*block.as_ptr()).status = status };
    }

    fn sizes(list: &BlockList) -> Vec<usize> {
        list.iter().map(|block| unsafe { block.as_ref().size }).collect()
    }

    #[test]
    fn forward_merge_stops_at_allocated_block() {
        let mut storage = [0u64; 128];
        let (mut list, blocks) = carve(&mut storage, &[64, 64, 64, 64]);
        set(blocks[0], Status::Free);
        set(blocks[1], Status::Free);
        set(blocks[3], Status::Free);

        unsafe { list.coalesce_forward(blocks[0]) };

        assert_eq!(sizes(&list), vec![128, 64, 64]);
        assert_eq!(list.last(), Some(blocks[3]));
    }

    #[test]
    fn forward_merge_ignores_allocated_start() {
        let mut storage = [0u64; 128];
        let (mut list, blocks) = carve(&mut storage, &[64, 64]);
        set(blocks[1], Status::Free);

        unsafe { list.coalesce_forward(blocks[0]) };

        assert_eq!(sizes(&list), vec![64, 64]);
    }

    #[test]
    fn absorbing_the_tail_moves_last() {
        let mut storage = [0u64; 128];
        let (mut list, blocks) = carve(&mut storage, &[64, 64, 96]);
        set(blocks[1], Status::Free);
        set(blocks[2], Status::Free);

        unsafe { list.absorb_successors(blocks[0]) };

        assert_eq!(sizes(&list), vec![224]);
        assert_eq!(list.last(), Some(blocks[0]));
        assert_eq!(list.len(), 1);
        assert_eq!(unsafe { blocks[0].as_ref().status }, Status::Allocated);
    }

    #[test]
    fn coalesce_all_leaves_no_free_neighbours() {
        let mut storage = [0u64; 128];
        let (mut list, blocks) = carve(&mut storage, &[64, 64, 64, 64, 64, 64]);
        for &index in &[0, 1, 3, 4, 5] {
            set(blocks[index], Status::Free);
        }

        list.coalesce_all();

        assert_eq!(sizes(&list), vec![128, 64, 192]);
        assert_eq!(list.last(), Some(blocks[3]));

        let statuses: Vec<_> = list.iter().map(|b| unsafe { b.as_ref().status }).collect();
        assert_eq!(statuses, vec![Status::Free, Status::Allocated, Status::Free]);
    }

    #[test]
    fn blocks_that_are_not_memory_neighbours_stay_apart() {
        let mut storage = [0u64; 128];
        let (mut list, blocks) = carve(&mut storage, &[64, 64]);

        unsafe {
            // A third block further up, with a gap after the second one.
            let addr = NonNull::new(storage.as_mut_ptr()).unwrap().cast::<u8>().add(192);
            let far = Block::init(addr, 64, Status::Free);
            list.append(far);
        }
        set(blocks[0], Status::Free);
        set(blocks[1], Status::Free);

        list.coalesce_all();

        assert_eq!(sizes(&list), vec![128, 64]);
    }
}
