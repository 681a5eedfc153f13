//! # Heap Allocator
//!
//! One fixed region carved into a singly linked sequence of blocks, each
//! preceded by an in-band header. Allocation is first fit and splits the
//! block it takes; freeing merges with free neighbours on both sides.
//!
//! ## Core Utilities
//!
//! - `AllocError`: allocation failure kinds
//! - `align_up`: word rounding for request sizes

mod core;
pub mod simple;

pub use self::core::AllocError;
pub use simple::{Heap, HeapStats, BLOCK_HEADER_SIZE, HEAP_ALIGN};
