//! Kernel memory: the heap allocator and the boot-time identity map.

pub mod allocators;
pub mod paging;

pub use allocators::{AllocError, Heap, HeapStats};

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod region {
    use core::sync::atomic::{AtomicBool, Ordering};

    use super::{AllocError, Heap};
    use crate::config::HEAP_SIZE;

    #[repr(align(4096))]
    struct HeapBuffer([u8; HEAP_SIZE]);

    static mut KERNEL_HEAP_BUFFER: HeapBuffer = HeapBuffer([0; HEAP_SIZE]);
    static HEAP_TAKEN: AtomicBool = AtomicBool::new(false);

    /// Hand the reserved heap region to a [`Heap`]. Only the first call
    /// succeeds.
    pub fn kernel_heap() -> Result<Heap, AllocError> {
        if HEAP_TAKEN.swap(true, Ordering::AcqRel) {
            return Err(AllocError::InvalidAddress);
        }
        // SAFETY: the flag above guarantees this is the only reference ever
        // created to the buffer.
        let memory: &'static mut [u8] = unsafe { &mut (*core::ptr::addr_of_mut!(KERNEL_HEAP_BUFFER)).0 };
        let base = memory.as_ptr() as u32;
        Heap::new(base, memory)
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use region::kernel_heap;
