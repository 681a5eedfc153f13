//! Initial register image for a process that has never run.
//!
//! A new stack is laid out as if the process had been interrupted just
//! before its first instruction, so the ordinary interrupt return path
//! starts it:
//!
//! ```text
//! stack top
//!   exit trampoline address   <- what `entry` returns into
//!   InterruptFrame            eip = entry, cs = kernel code, IF set
//!                             <- saved esp
//! stack bottom
//! ```

use x86_64::registers::rflags::RFlags;

use crate::interrupts::frame::{InterruptFrame, FRAME_SIZE};
use crate::interrupts::gdt::KERNEL_CODE_SELECTOR;

/// EFLAGS bit 1 reads as one on every x86.
const EFLAGS_RESERVED: u32 = 1 << 1;

/// EFLAGS for a fresh process: interrupts enabled.
pub const INITIAL_EFLAGS: u32 = RFlags::INTERRUPT_FLAG.bits() as u32 | EFLAGS_RESERVED;

/// Registers kept in a process record while it is not running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedContext {
    pub esp: u32,
    pub ebp: u32,
    pub eip: u32,
}

/// Builds the first frame a process is resumed from.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    pub entry: u32,
    pub exit_trampoline: u32,
}

impl ContextBuilder {
    pub fn new(entry: u32, exit_trampoline: u32) -> Self {
        Self {
            entry,
            exit_trampoline,
        }
    }

    /// Bytes the image occupies at the top of the stack.
    pub const fn image_size() -> u32 {
        FRAME_SIZE + 4
    }

    /// Write the image into the top of `stack`, which the kernel sees at
    /// `stack_base`, and return the context to resume from.
    ///
    /// `stack` must be at least [`image_size`](Self::image_size) bytes.
    pub fn build(&self, stack_base: u32, stack: &mut [u8]) -> SavedContext {
        let len = stack.len();
        let top = stack_base + len as u32;
        let return_slot = top - 4;
        let frame_addr = return_slot - FRAME_SIZE;

        let frame = InterruptFrame {
            ebp: return_slot,
            // Where esp pointed before pushad, just above the pushed registers.
            esp: frame_addr + 32,
            eip: self.entry,
            cs: u32::from(KERNEL_CODE_SELECTOR.0),
            eflags: INITIAL_EFLAGS,
            ..InterruptFrame::default()
        };

        stack[len - 4..].copy_from_slice(&self.exit_trampoline.to_le_bytes());
        let frame_offset = len - Self::image_size() as usize;
        frame.write_to(&mut stack[frame_offset..len - 4]);

        SavedContext {
            esp: frame_addr,
            ebp: return_slot,
            eip: self.entry,
        }
    }
}
