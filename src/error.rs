use std::{
    fmt::{self, Write as _},
    io::Write as _,
};

/// Failures reported by a [`PlatformMemory`](crate::kernel::PlatformMemory) primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    #[error("program break cannot grow by {requested} bytes")]
    BreakExhausted { requested: usize },

    #[error("program break expected at {expected:#x} but found at {found:#x}")]
    BreakMoved { expected: usize, found: usize },

    #[error("anonymous mapping of {len} bytes failed")]
    MapFailed { len: usize },

    #[error("unmapping {len} bytes at {addr:#x} failed")]
    UnmapFailed { addr: usize, len: usize },
}

/// Rejected [`HeapConfig`](crate::config::HeapConfig) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a multiple of 8 and at least {min} bytes, got {value}")]
    Threshold {
        name: &'static str,
        value: usize,
        min: usize,
    },

    #[error("prealloc_size ({prealloc}) must not be smaller than mmap_threshold ({threshold})")]
    PreallocTooSmall { prealloc: usize, threshold: usize },
}

/// Fixed-capacity line buffer. The allocator may be the process allocator,
/// so fatal reports cannot go through `String`.
struct StackWriter {
    buf: [u8; 256],
    len: usize,
}

impl fmt::Write for StackWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;

        Ok(())
    }
}

/// Reports an unrecoverable provisioning failure on stderr and aborts the process.
#[cold]
#[inline(never)]
pub(crate) fn die(context: &str, err: &dyn fmt::Display) -> ! {
    let mut line = StackWriter {
        buf: [0; 256],
        len: 0,
    };
    let _ = writeln!(line, "brkalloc: {context}: {err}");

    let _ = std::io::stderr().write_all(&line.buf[..line.len]);
    std::process::abort()
}
