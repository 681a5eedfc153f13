// gdt.rs
//! Flat 4 GiB segments for rings 0 and 3.
//!
//! | Index | Selector | Segment     | Access |
//! |-------|----------|-------------|--------|
//! | 0     | 0x00     | null        | 0x00   |
//! | 1     | 0x08     | kernel code | 0x9A   |
//! | 2     | 0x10     | kernel data | 0x92   |
//! | 3     | 0x1B     | user code   | 0xFA   |
//! | 4     | 0x23     | user data   | 0xF2   |

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

pub const GDT_ENTRIES: usize = 5;

pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
pub const KERNEL_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
pub const USER_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring3);
pub const USER_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3);

// Access byte bits.
const PRESENT: u8 = 1 << 7;
const CODE_OR_DATA: u8 = 1 << 4;
const EXECUTABLE: u8 = 1 << 3;
const READ_WRITE: u8 = 1 << 1;

/// 4 KiB granularity and 32-bit default operand size.
const FLAT_GRANULARITY: u8 = 0xC0;

const fn access(ring: PrivilegeLevel, executable: bool) -> u8 {
    let exec = if executable { EXECUTABLE } else { 0 };
    PRESENT | ((ring as u8) << 5) | CODE_OR_DATA | exec | READ_WRITE
}

/// Pack one descriptor into its 8-byte hardware form.
pub const fn encode(base: u32, limit: u32, access: u8, granularity: u8) -> u64 {
    let limit_low = (limit & 0xFFFF) as u64;
    let base_low = (base & 0xFFFF) as u64;
    let base_middle = ((base >> 16) & 0xFF) as u64;
    let base_high = ((base >> 24) & 0xFF) as u64;
    let flags = (((limit >> 16) & 0x0F) as u8 | (granularity & 0xF0)) as u64;

    limit_low | (base_low << 16) | (base_middle << 32) | ((access as u64) << 40) | (flags << 48) | (base_high << 56)
}

const fn flat(ring: PrivilegeLevel, executable: bool) -> u64 {
    encode(0, 0xFFFF_FFFF, access(ring, executable), FLAT_GRANULARITY)
}

#[repr(C, align(8))]
pub struct Gdt {
    entries: [u64; GDT_ENTRIES],
}

impl Gdt {
    pub const fn new() -> Self {
        Self {
            entries: [
                0,
                flat(PrivilegeLevel::Ring0, true),
                flat(PrivilegeLevel::Ring0, false),
                flat(PrivilegeLevel::Ring3, true),
                flat(PrivilegeLevel::Ring3, false),
            ],
        }
    }

    pub fn entries(&self) -> &[u64; GDT_ENTRIES] {
        &self.entries
    }

    /// Load the table and reload every segment register from it.
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    pub fn load(&'static self) {
        use core::arch::asm;

        let pointer = super::idt::DescriptorTablePointer {
            limit: (core::mem::size_of::<Self>() - 1) as u16,
            base: self.entries.as_ptr() as u32,
        };
        unsafe {
            asm!("lgdt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
            asm!(
                "push {code}",
                "lea {tmp}, [2f]",
                "push {tmp}",
                "retf",
                "2:",
                "mov ds, {data:x}",
                "mov es, {data:x}",
                "mov fs, {data:x}",
                "mov gs, {data:x}",
                "mov ss, {data:x}",
                code = in(reg) u32::from(KERNEL_CODE_SELECTOR.0),
                data = in(reg) u32::from(KERNEL_DATA_SELECTOR.0),
                tmp = lateout(reg) _,
            );
        }
    }

    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    pub fn load(&'static self) {}
}

impl Default for Gdt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_table_layout() {
        assert_eq!(KERNEL_CODE_SELECTOR.0, 0x08);
        assert_eq!(KERNEL_DATA_SELECTOR.0, 0x10);
        assert_eq!(USER_CODE_SELECTOR.0, 0x1B);
        assert_eq!(USER_DATA_SELECTOR.0, 0x23);
    }

    #[test]
    fn flat_segments_encode_like_the_hardware_expects() {
        let gdt = Gdt::new();
        let e = gdt.entries();
        assert_eq!(e[0], 0);
        assert_eq!(e[1], 0x00CF_9A00_0000_FFFF);
        assert_eq!(e[2], 0x00CF_9200_0000_FFFF);
        assert_eq!(e[3], 0x00CF_FA00_0000_FFFF);
        assert_eq!(e[4], 0x00CF_F200_0000_FFFF);
    }

    #[test]
    fn base_is_split_across_three_fields() {
        let raw = encode(0x1234_5678, 0xFFFFF, 0x92, 0xC0);
        assert_eq!(raw & 0xFFFF, 0xFFFF);
        assert_eq!((raw >> 16) & 0xFFFF, 0x5678);
        assert_eq!((raw >> 32) & 0xFF, 0x34);
        assert_eq!((raw >> 56) & 0xFF, 0x12);
        assert_eq!((raw >> 48) & 0xFF, 0xCF);
    }
}
