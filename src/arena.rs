use std::ptr::NonNull;

use log::{debug, warn};

use crate::{
    block::{Block, MIN_BLOCK_SIZE, Status},
    error::ProvisionError,
    heap::Heap,
    kernel::PlatformMemory,
    utils::{ALIGNMENT, padding},
};

/// How many times a growth is retried when the break keeps moving under us.
const GROW_ATTEMPTS: usize = 3;

impl<P: PlatformMemory> Heap<P> {
    /// Moves the program break up by `size` bytes and appends the new memory
    /// to the arena as one allocated block.
    ///
    /// The break is padded up to [`ALIGNMENT`] first. If somebody else moves
    /// it between our query and our growth, whatever we got is kept as a free
    /// block and the growth is tried again.
    pub(crate) fn grow_arena(&mut self, size: usize) -> Result<NonNull<Block>, ProvisionError> {
        debug_assert!(size >= MIN_BLOCK_SIZE && size % ALIGNMENT == 0);

        let mut found = 0;

        for _ in 0..GROW_ATTEMPTS {
            unsafe {
                let brk = self.memory.extend_break(0)?;
                let pad = padding(brk.as_ptr() as usize, ALIGNMENT);
                let increment = size
                    .checked_add(pad)
                    .ok_or(ProvisionError::BreakExhausted { requested: size })?;

                let prev = self.memory.extend_break(increment)?;
                let lead = padding(prev.as_ptr() as usize, ALIGNMENT);

                if lead <= pad {
                    let block = Block::init(prev.add(lead), size, Status::Allocated);
                    self.blocks.append(block);

                    debug!("[brkalloc] arena grew by {increment} bytes, new block at {block:p}");
                    return Ok(block);
                }

                self.adopt_stray(prev, increment);
                found = prev.as_ptr() as usize;
            }
        }

        Err(ProvisionError::BreakMoved {
            expected: found - found % ALIGNMENT,
            found,
        })
    }

    /// Grows the arena tail in place by `shortfall` bytes.
    ///
    /// Only possible while the program break still sits right at the end of
    /// the tail. If it moved in between, this fails with
    /// [`ProvisionError::BreakMoved`] and the tail is left as it was.
    ///
    /// **SAFETY**: `tail` must be the last block of the arena.
    pub(crate) unsafe fn extend_tail(
        &mut self,
        mut tail: NonNull<Block>,
        shortfall: usize,
    ) -> Result<(), ProvisionError> {
        debug_assert_eq!(self.blocks.last(), Some(tail));
        debug_assert_eq!(shortfall % ALIGNMENT, 0, "unaligned tail extension");

        let expected = Block::end(tail);

        unsafe {
            let brk = self.memory.extend_break(0)?.as_ptr() as usize;
            if brk != expected {
                return Err(ProvisionError::BreakMoved { expected, found: brk });
            }

            let prev = self.memory.extend_break(shortfall)?;
            if prev.as_ptr() as usize != expected {
                self.adopt_stray(prev, shortfall);
                return Err(ProvisionError::BreakMoved {
                    expected,
                    found: prev.as_ptr() as usize,
                });
            }

            tail.as_mut().size += shortfall;
        }

        debug!("[brkalloc] extended arena tail {tail:p} by {shortfall} bytes");
        Ok(())
    }

    /// Keeps break memory that ended up away from the tail, because somebody
    /// else moved the break between our query and our growth.
    unsafe fn adopt_stray(&mut self, addr: NonNull<u8>, len: usize) {
        let pad = padding(addr.as_ptr() as usize, ALIGNMENT);

        if len < pad + MIN_BLOCK_SIZE {
            warn!("[brkalloc] abandoning {len} stray bytes of program break at {addr:p}");
            return;
        }

        let size = (len - pad) & !(ALIGNMENT - 1);
        unsafe {
            let block = Block::init(addr.add(pad), size, Status::Free);
            self.blocks.append(block);
        }
    }
}
