//! brkalloc: a best-fit heap allocator on top of the program break.
//!
//! Small requests are carved out of one contiguous arena that only ever
//! grows through the program break (`sbrk`). Every block carries an in-band
//! header:
//!
//! ```text
//! +-------------------------------+
//! | Header   | Actual memory block|
//! +-------------------------------+
//!            ^
//!            +-- pointer handed to the user
//! ```
//!
//! Free blocks are merged with their free neighbours right before each
//! search, the smallest block that fits wins, and it gets split when the
//! leftover is big enough to be useful. Requests of 128 KiB or more skip the
//! arena and get their own anonymous mapping.
//!
//! [`Heap`] holds all the state and is not thread safe on its own.
//! [`BrkAlloc`] puts it behind a lock so it can be the process allocator:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOCATOR: brkalloc::BrkAlloc = brkalloc::BrkAlloc::new();
//! ```
//!
//! Operations are traced through the [`log`] facade. A logger installed in a
//! process that uses [`BrkAlloc`] as its global allocator must not allocate
//! while logging, or it would re-enter the allocator.

mod arena;
mod block;
mod coalesce;
mod fit;
mod list;
mod mmap;
mod split;

pub mod config;
pub mod error;
pub mod global;
pub mod heap;
pub mod kernel;
pub mod utils;

#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(test)]
mod testing;

pub use config::{HeapConfig, MMAP_THRESHOLD};
pub use error::{ConfigError, ProvisionError};
pub use global::BrkAlloc;
pub use heap::Heap;
pub use kernel::{Kernel, PlatformMemory};
