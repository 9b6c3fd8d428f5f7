use crate::{block::MIN_BLOCK_SIZE, error::ConfigError, utils::ALIGNMENT};

/// Requests whose block would reach this many bytes bypass the arena.
pub const MMAP_THRESHOLD: usize = 128 * 1024;

/// Tunables of a [`Heap`](crate::Heap).
///
/// The defaults reproduce the classic layout: a 128 KiB large-region
/// threshold, a first arena growth of the same size, and page-sized
/// threshold for zero-initialized requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Block size at which [`Heap::allocate`](crate::Heap::allocate) maps a standalone region.
    pub mmap_threshold: usize,
    /// Size of the very first arena growth.
    pub prealloc_size: usize,
    /// Block size at which [`Heap::zero_allocate`](crate::Heap::zero_allocate) maps a
    /// standalone region. `None` means the platform page size.
    pub zeroed_threshold: Option<usize>,
}

impl HeapConfig {
    pub const DEFAULT: Self = Self {
        mmap_threshold: MMAP_THRESHOLD,
        prealloc_size: MMAP_THRESHOLD,
        zeroed_threshold: None,
    };

    pub const fn new() -> Self {
        Self::DEFAULT
    }

    /// Also raises `prealloc_size` when it would end up below the new threshold.
    pub const fn with_mmap_threshold(mut self, threshold: usize) -> Self {
        self.mmap_threshold = threshold;
        if self.prealloc_size < threshold {
            self.prealloc_size = threshold;
        }
        self
    }

    pub const fn with_prealloc_size(mut self, size: usize) -> Self {
        self.prealloc_size = size;
        self
    }

    pub const fn with_zeroed_threshold(mut self, threshold: usize) -> Self {
        self.zeroed_threshold = Some(threshold);
        self
    }

    /// Checks that every size can actually describe a block.
    pub const fn validate(self) -> Result<Self, ConfigError> {
        if let Err(err) = check_threshold("mmap_threshold", self.mmap_threshold) {
            return Err(err);
        }
        if let Err(err) = check_threshold("prealloc_size", self.prealloc_size) {
            return Err(err);
        }
        if let Some(zeroed) = self.zeroed_threshold {
            if let Err(err) = check_threshold("zeroed_threshold", zeroed) {
                return Err(err);
            }
        }
        if self.prealloc_size < self.mmap_threshold {
            return Err(ConfigError::PreallocTooSmall {
                prealloc: self.prealloc_size,
                threshold: self.mmap_threshold,
            });
        }

        Ok(self)
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

const fn check_threshold(name: &'static str, value: usize) -> Result<(), ConfigError> {
    // The smallest request still needs one full block below the threshold.
    let min = MIN_BLOCK_SIZE + ALIGNMENT;

    if value < min || value % ALIGNMENT != 0 {
        return Err(ConfigError::Threshold { name, value, min });
    }

    Ok(())
}
