use std::ptr::NonNull;

use log::debug;

use crate::{block::Block, heap::Heap, kernel::PlatformMemory};

impl<P: PlatformMemory> Heap<P> {
    /// Returns the [`Block`] where we can place a block of `size` bytes.
    ///
    /// This uses the best-fit algorithm: out of every free block big enough,
    /// the smallest one wins, and on equal sizes the lowest address does.
    ///
    /// When nothing fits but the arena tail is free, the tail is grown in
    /// place up to `size` instead of paying for a whole new block. If the
    /// break cannot move, that is not an error here: the caller falls back
    /// to a fresh arena growth.
    pub(crate) fn find_best_fit(&mut self, size: usize) -> Option<NonNull<Block>> {
        let mut best: Option<NonNull<Block>> = None;

        for node in &self.blocks {
            let block = unsafe { node.as_ref() };

            if !block.is_free() || block.size < size {
                continue;
            }

            match best {
                Some(current) if unsafe { current.as_ref().size } <= block.size => {}
                _ => best = Some(node),
            }
        }

        if best.is_some() {
            return best;
        }

        let tail = self.blocks.last()?;
        let tail_size = unsafe { tail.as_ref().size };

        if !unsafe { tail.as_ref().is_free() } || tail_size >= size {
            return None;
        }

        match unsafe { self.extend_tail(tail, size - tail_size) } {
            Ok(()) => Some(tail),
            Err(err) => {
                debug!("[brkalloc] cannot grow free tail {tail:p}: {err}");
                None
            }
        }
    }
}
