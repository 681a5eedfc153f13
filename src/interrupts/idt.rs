//! 256-entry interrupt descriptor table.
//!
//! Entries start zeroed (not present). The kernel fills in the stubs it has;
//! a vector whose gate is absent faults with #GP when raised, and the #GP
//! stub reports it.

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

pub const IDT_ENTRIES: usize = 256;

const GATE_PRESENT: u8 = 1 << 7;
const INTERRUPT_GATE_32: u8 = 0xE;

/// Present 32-bit interrupt gate reachable from `ring` (0x8E for ring 0,
/// 0xEE for ring 3).
pub const fn interrupt_gate(ring: PrivilegeLevel) -> u8 {
    GATE_PRESENT | ((ring as u8) << 5) | INTERRUPT_GATE_32
}

pub const KERNEL_INTERRUPT_GATE: u8 = interrupt_gate(PrivilegeLevel::Ring0);
pub const USER_INTERRUPT_GATE: u8 = interrupt_gate(PrivilegeLevel::Ring3);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct IdtEntry {
    pub base_lo: u16,
    pub selector: u16,
    pub always0: u8,
    pub flags: u8,
    pub base_hi: u16,
}

impl IdtEntry {
    pub const fn missing() -> Self {
        Self {
            base_lo: 0,
            selector: 0,
            always0: 0,
            flags: 0,
            base_hi: 0,
        }
    }

    pub fn handler(&self) -> u32 {
        u32::from(self.base_hi) << 16 | u32::from(self.base_lo)
    }

    pub fn is_present(&self) -> bool {
        self.flags & GATE_PRESENT != 0
    }
}

/// Operand of `lgdt`/`lidt`.
#[repr(C, packed)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u32,
}

#[repr(C, align(8))]
pub struct Idt {
    entries: [IdtEntry; IDT_ENTRIES],
}

impl Idt {
    pub const fn new() -> Self {
        Self {
            entries: [IdtEntry::missing(); IDT_ENTRIES],
        }
    }

    /// Point `vector` at `handler`. Writing the same gate twice is harmless.
    pub fn set_gate(&mut self, vector: u8, handler: u32, selector: SegmentSelector, flags: u8) {
        self.entries[vector as usize] = IdtEntry {
            base_lo: (handler & 0xFFFF) as u16,
            selector: selector.0,
            always0: 0,
            flags,
            base_hi: (handler >> 16) as u16,
        };
    }

    pub fn entry(&self, vector: u8) -> &IdtEntry {
        &self.entries[vector as usize]
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (core::mem::size_of::<[IdtEntry; IDT_ENTRIES]>() - 1) as u16,
            base: self.entries.as_ptr() as usize as u32,
        }
    }

    /// # Safety
    /// The table must stay at this address for as long as interrupts can
    /// fire, and every present gate must point at a valid stub.
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    pub unsafe fn load(&self) {
        let pointer = self.pointer();
        core::arch::asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
    }

    /// # Safety
    /// Inert on hosted builds.
    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    pub unsafe fn load(&self) {}
}

impl Default for Idt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::gdt::KERNEL_CODE_SELECTOR;

    #[test]
    fn gate_flags_encode_ring() {
        assert_eq!(KERNEL_INTERRUPT_GATE, 0x8E);
        assert_eq!(USER_INTERRUPT_GATE, 0xEE);
    }

    #[test]
    fn set_gate_splits_handler_address() {
        let mut idt = Idt::new();
        assert!(!idt.entry(33).is_present());

        idt.set_gate(33, 0x0012_3456, KERNEL_CODE_SELECTOR, KERNEL_INTERRUPT_GATE);
        idt.set_gate(33, 0x0012_3456, KERNEL_CODE_SELECTOR, KERNEL_INTERRUPT_GATE);
        let entry = *idt.entry(33);
        assert_eq!(entry.base_lo, 0x3456);
        assert_eq!(entry.base_hi, 0x0012);
        assert_eq!(entry.selector, 0x08);
        assert_eq!(entry.always0, 0);
        assert_eq!(entry.handler(), 0x0012_3456);
        assert!(entry.is_present());
        assert_eq!(*idt.entry(32), IdtEntry::missing());
    }

    #[test]
    fn table_is_two_kilobytes() {
        assert_eq!(core::mem::size_of::<IdtEntry>(), 8);
        let limit = Idt::new().pointer().limit;
        assert_eq!(limit, 2047);
    }
}
