/// Shared helpers and the error type for the heap allocator
use core::fmt;

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

#[inline]
pub(crate) const fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

#[inline]
pub(crate) fn is_aligned(value: u32, align: u32) -> bool {
    value & (align - 1) == 0
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No free block is large enough.
    OutOfMemory,
    /// Zero-byte request, or a request that overflows the address space.
    InvalidSize,
    /// The address does not belong to the managed region.
    InvalidAddress,
    /// The region cannot hold even one block header.
    RegionTooSmall,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory => f.write_str("out of memory"),
            AllocError::InvalidSize => f.write_str("invalid allocation size"),
            AllocError::InvalidAddress => f.write_str("address outside the heap"),
            AllocError::RegionTooSmall => f.write_str("heap region too small"),
        }
    }
}
