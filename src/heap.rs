use std::ptr::{self, NonNull};

use log::trace;

use crate::{
    block::{BLOCK_HEADER_SIZE, Block, MIN_BLOCK_SIZE, Status, block_size},
    config::HeapConfig,
    error::{ConfigError, die},
    kernel::{Kernel, PlatformMemory},
    list::BlockList,
    utils::{ALIGNMENT, padding},
};

/// The allocator's state: one arena grown through the program break, plus
/// however many standalone mappings are alive.
///
/// ```text
///  global_base                                   last
///      |                                           |
///  +---v---+-------+-------+-------+-------+-------v-------+
///  | Block | Block | Block | Block | Block |  Free Block   | <- program break
///  +-------+-------+-------+-------+-------+---------------+
/// ```
///
/// Small requests are served from the arena: every allocation first merges
/// neighbouring free blocks, then looks for the best fitting one and splits
/// it, and only grows the arena when nothing fits. Releasing an arena block
/// just marks it free. Requests at or above the mapping threshold get their
/// own mapping instead.
///
/// A `Heap` is a plain value and every operation takes `&mut self`. It has
/// no synchronization of its own: to share one between threads wrap it in a
/// lock, as [`BrkAlloc`](crate::BrkAlloc) does.
pub struct Heap<P: PlatformMemory = Kernel> {
    /// Every block of the arena, in address order.
    pub(crate) blocks: BlockList,
    /// Whether the arena got its first, threshold sized, growth.
    prealloc: bool,
    config: HeapConfig,
    pub(crate) memory: P,
}

impl<P: PlatformMemory> Heap<P> {
    /// Creates an empty heap with the default [`HeapConfig`]. Nothing is
    /// requested from `memory` until the first allocation.
    pub const fn new(memory: P) -> Self {
        Self {
            blocks: BlockList::new(),
            prealloc: false,
            config: HeapConfig::DEFAULT,
            memory,
        }
    }

    pub fn with_config(memory: P, config: HeapConfig) -> Result<Self, ConfigError> {
        let config = config.validate()?;

        Ok(Self {
            config,
            ..Self::new(memory)
        })
    }

    /// Same as [`Heap::with_config`] for a configuration already validated.
    pub(crate) const fn with_valid_config(memory: P, config: HeapConfig) -> Self {
        Self {
            blocks: BlockList::new(),
            prealloc: false,
            config,
            memory,
        }
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    #[inline]
    pub fn memory(&self) -> &P {
        &self.memory
    }

    #[inline]
    pub fn memory_mut(&mut self) -> &mut P {
        &mut self.memory
    }

    /// Returns a pointer to at least `size` usable bytes aligned to 8, or
    /// null when `size` is zero.
    ///
    /// Aborts the process if the kernel refuses to provide the memory.
    ///
    /// # Safety
    ///
    /// The returned memory is uninitialized and must only be given back
    /// through this same heap.
    pub unsafe fn allocate(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        let Some(blk_size) = block_size(size) else {
            return ptr::null_mut();
        };

        let block = if blk_size >= self.config.mmap_threshold {
            self.map_block(blk_size)
                .unwrap_or_else(|err| die("mapping a large block failed", &err))
        } else {
            self.arena_block(blk_size)
        };

        let payload = Block::payload(block).as_ptr();
        trace!("[brkalloc] allocate({size}) -> {payload:p}");
        payload
    }

    /// Hands out an allocated arena block of exactly `blk_size` bytes (or a
    /// few more when the leftover was too small to split off).
    fn arena_block(&mut self, blk_size: usize) -> NonNull<Block> {
        if !self.prealloc {
            return self.preallocate(blk_size);
        }

        self.blocks.coalesce_all();

        match self.find_best_fit(blk_size) {
            Some(mut block) => unsafe {
                self.blocks.split(block, blk_size);
                block.as_mut().status = Status::Allocated;
                block
            },
            None => self
                .grow_arena(blk_size)
                .unwrap_or_else(|err| die("growing the arena failed", &err)),
        }
    }

    /// First arena growth: the whole threshold at once, carved down to the
    /// requested block right away.
    fn preallocate(&mut self, blk_size: usize) -> NonNull<Block> {
        debug_assert!(self.blocks.is_empty());

        let block = self
            .grow_arena(self.config.prealloc_size)
            .unwrap_or_else(|err| die("preallocating the arena failed", &err));

        unsafe { self.blocks.split(block, blk_size) };
        self.prealloc = true;

        block
    }

    /// Returns a pointer to `count * size` zeroed bytes, or null when either
    /// argument is zero or their product overflows.
    ///
    /// Blocks at or above the zeroed threshold (a page by default) are
    /// mapped right away, even though [`Heap::allocate`] would keep them in
    /// the arena.
    ///
    /// # Safety
    ///
    /// Same as [`Heap::allocate`].
    pub unsafe fn zero_allocate(&mut self, count: usize, size: usize) -> *mut u8 {
        if count == 0 || size == 0 {
            return ptr::null_mut();
        }
        let Some(blk_size) = count.checked_mul(size).and_then(block_size) else {
            return ptr::null_mut();
        };

        let threshold = self
            .config
            .zeroed_threshold
            .unwrap_or_else(|| self.memory.page_size());

        let payload = if blk_size >= threshold {
            let block = self
                .map_block(blk_size)
                .unwrap_or_else(|err| die("mapping a zeroed block failed", &err));
            Block::payload(block).as_ptr()
        } else {
            unsafe { self.allocate(blk_size - BLOCK_HEADER_SIZE) }
        };

        unsafe { ptr::write_bytes(payload, 0, blk_size - BLOCK_HEADER_SIZE) };

        trace!("[brkalloc] zero_allocate({count}, {size}) -> {payload:p}");
        payload
    }

    /// Gives a block back. Null pointers and blocks that are already free are
    /// ignored. Arena blocks are only marked free, merging happens on the
    /// next allocation. Mapped blocks go straight back to the kernel.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by this heap. Releasing
    /// anything else is undefined behaviour.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else {
            return;
        };

        unsafe {
            let mut block = Block::from_payload(payload);

            match block.as_ref().status {
                Status::Free => return,
                Status::Mapped => self
                    .unmap_block(block)
                    .unwrap_or_else(|err| die("unmapping a large block failed", &err)),
                Status::Allocated => block.as_mut().status = Status::Free,
            }
        }

        trace!("[brkalloc] release({ptr:p})");
    }

    /// Resizes the block behind `ptr` to hold at least `size` bytes,
    /// keeping the common prefix of the old and new contents.
    ///
    /// Growing is attempted in place first: shrinking the block, extending
    /// the arena tail, or absorbing free neighbours. Only when none of those
    /// apply is a new block allocated and the contents copied over.
    ///
    /// A `size` of zero releases the block and returns null, a null `ptr`
    /// behaves like [`Heap::allocate`]. Resizing a block that was already
    /// released returns null and changes nothing.
    ///
    /// A tail that cannot be extended because the program break refused or
    /// moved is not fatal here: the other in-place options and relocation
    /// are tried next. Only a relocation that cannot get memory aborts.
    ///
    /// # Safety
    ///
    /// Same as [`Heap::release`]. When a different pointer is returned, `ptr`
    /// is no longer valid.
    pub unsafe fn resize(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        if size == 0 {
            unsafe { self.release(ptr) };
            return ptr::null_mut();
        }
        let Some(payload) = NonNull::new(ptr) else {
            return unsafe { self.allocate(size) };
        };
        let Some(new_size) = block_size(size) else {
            return ptr::null_mut();
        };

        let block = unsafe { Block::from_payload(payload) };
        let (status, old_size) = unsafe { (block.as_ref().status, block.as_ref().size) };

        if status == Status::Free {
            return ptr::null_mut();
        }

        if status == Status::Mapped || new_size >= self.config.mmap_threshold {
            return unsafe { self.relocate(payload, size) };
        }

        if old_size >= new_size {
            unsafe { self.blocks.split(block, new_size) };
            trace!("[brkalloc] resize({ptr:p}, {size}) shrank in place");
            return ptr;
        }

        // Both sizes are multiples of ALIGNMENT, so is the shortfall.
        if self.blocks.last() == Some(block) {
            match unsafe { self.extend_tail(block, new_size - old_size) } {
                Ok(()) => {
                    trace!("[brkalloc] resize({ptr:p}, {size}) grew the arena tail");
                    return ptr;
                }
                Err(err) => trace!("[brkalloc] resize({ptr:p}, {size}) tail stuck: {err}"),
            }
        }

        unsafe {
            self.blocks.absorb_successors(block);

            if block.as_ref().size >= new_size {
                self.blocks.split(block, new_size);
                trace!("[brkalloc] resize({ptr:p}, {size}) absorbed free neighbours");
                return ptr;
            }

            self.relocate(payload, size)
        }
    }

    /// Moves the contents of `payload` into a fresh block of `size` bytes and
    /// releases the old one.
    unsafe fn relocate(&mut self, payload: NonNull<u8>, size: usize) -> *mut u8 {
        unsafe {
            let old_usable = Block::from_payload(payload).as_ref().usable();

            let new = self.allocate(size);
            ptr::copy_nonoverlapping(payload.as_ptr(), new, old_usable.min(size));
            self.release(payload.as_ptr());

            trace!("[brkalloc] resize({payload:p}, {size}) moved to {new:p}");
            new
        }
    }

    /// Returns a pointer to at least `size` bytes aligned to `align`, which
    /// must be a power of two. Alignments up to 8 behave like
    /// [`Heap::allocate`].
    ///
    /// Alignments up to the page size are carved out of the arena: a block
    /// wide enough for any placement is taken, the bytes in front of the
    /// aligned payload go back as a free block and the tail is split off as
    /// usual. Larger alignments, and requests that would reach the mapping
    /// threshold, get their own mapping.
    ///
    /// Returns null when `size` is zero or the request cannot be described.
    ///
    /// # Safety
    ///
    /// Same as [`Heap::allocate`].
    pub unsafe fn allocate_aligned(&mut self, size: usize, align: usize) -> *mut u8 {
        debug_assert!(align.is_power_of_two());

        if align <= ALIGNMENT {
            return unsafe { self.allocate(size) };
        }
        if size == 0 {
            return ptr::null_mut();
        }
        let Some(blk_size) = block_size(size) else {
            return ptr::null_mut();
        };

        let wide = blk_size.checked_add(align + MIN_BLOCK_SIZE);
        let payload = match wide {
            Some(wide) if align <= self.memory.page_size() && wide < self.config.mmap_threshold => unsafe {
                let block = self.arena_block(wide);
                let block = match front_slack(block, align) {
                    0 => block,
                    lead => self.blocks.split_front(block, lead),
                };
                self.blocks.split(block, blk_size);

                Block::payload(block).as_ptr()
            },
            _ => match self.map_aligned_block(size, align) {
                Ok(Some(block)) => Block::payload(block).as_ptr(),
                Ok(None) => return ptr::null_mut(),
                Err(err) => die("mapping an aligned block failed", &err),
            },
        };

        debug_assert_eq!(payload as usize % align, 0);
        trace!("[brkalloc] allocate_aligned({size}, {align}) -> {payload:p}");
        payload
    }
}

/// Bytes to skip at the start of `block` so that the payload of a header
/// placed there is aligned to `align`. Either zero or big enough to stand
/// on its own as a free block.
fn front_slack(block: NonNull<Block>, align: usize) -> usize {
    let payload = block.as_ptr() as usize + BLOCK_HEADER_SIZE;
    let mut lead = padding(payload, align);

    if lead != 0 {
        while lead < MIN_BLOCK_SIZE {
            lead += align;
        }
    }

    lead
}
