//! CPU control: interrupt flag, halt, control registers.

use x86_64::registers::rflags::RFlags;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod imp {
    use core::arch::asm;

    #[inline]
    pub fn read_eflags() -> u32 {
        let flags: u32;
        unsafe {
            asm!("pushfd", "pop {}", out(reg) flags, options(nomem, preserves_flags));
        }
        flags
    }

    #[inline]
    pub fn disable_interrupts() {
        unsafe { asm!("cli", options(nomem, nostack)) }
    }

    #[inline]
    pub fn enable_interrupts() {
        unsafe { asm!("sti", options(nomem, nostack)) }
    }

    #[inline]
    pub fn halt() {
        unsafe { asm!("hlt", options(nomem, nostack, preserves_flags)) }
    }

    /// # Safety
    /// `page_directory` must be the physical address of a valid, 4 KiB
    /// aligned page directory that identity maps the running kernel.
    pub unsafe fn enable_paging(page_directory: u32) {
        asm!("mov cr3, {}", in(reg) page_directory, options(nostack, preserves_flags));
        let mut cr0: u32;
        asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        cr0 |= super::CR0_PAGING;
        asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
mod imp {
    pub fn read_eflags() -> u32 {
        0
    }

    pub fn disable_interrupts() {}

    pub fn enable_interrupts() {}

    pub fn halt() {
        core::hint::spin_loop();
    }

    pub unsafe fn enable_paging(_page_directory: u32) {}
}

/// CR0.PG
pub const CR0_PAGING: u32 = 1 << 31;

pub use imp::{disable_interrupts, enable_interrupts, enable_paging, halt};

pub fn interrupts_enabled() -> bool {
    imp::read_eflags() & RFlags::INTERRUPT_FLAG.bits() as u32 != 0
}

/// Park the CPU for good. Interrupts stay off, so only NMI or reset leave this.
pub fn halt_forever() -> ! {
    disable_interrupts();
    loop {
        halt();
    }
}
