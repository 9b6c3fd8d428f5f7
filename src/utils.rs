//! Helper functions that don't particularly belong to any concrete module of the allocator.

/// Every block size and every payload address handed out is a multiple of this.
pub const ALIGNMENT: usize = 8;

/// It aligns `to_be_aligned` using `aligment`, which must be a power of two.
///
/// Used to round block sizes up to [`ALIGNMENT`] and to round the program
/// break or a mapping base up to whatever the caller needs. Returns `None`
/// when rounding up would overflow, so callers can treat absurd requests as
/// invalid arguments instead of wrapping around.
pub const fn align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    debug_assert!(aligment.is_power_of_two());

    match to_be_aligned.checked_add(aligment - 1) {
        Some(value) => Some(value & !(aligment - 1)),
        None => None,
    }
}

/// Bytes needed to move `addr` up to the next multiple of `aligment`.
#[inline]
pub const fn padding(addr: usize, aligment: usize) -> usize {
    addr.wrapping_neg() & (aligment - 1)
}
