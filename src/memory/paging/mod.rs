//! # Paging Module
//!
//! One page directory and one page table identity-mapping the first 4 MiB.
//! Every other directory slot is writable but not present, so any access
//! above 4 MiB faults.

use x86_64::structures::paging::PageTableFlags;

pub const ENTRIES: usize = 1024;
pub const PAGE_SIZE: u32 = 4096;

/// Bytes covered by the single page table.
pub const IDENTITY_MAPPED: u32 = ENTRIES as u32 * PAGE_SIZE;

fn flags(flags: PageTableFlags) -> u32 {
    flags.bits() as u32
}

#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [u32; ENTRIES],
}

impl PageTable {
    pub const fn zeroed() -> Self {
        Self {
            entries: [0; ENTRIES],
        }
    }
}

/// Directory plus the table it points at.
#[repr(C)]
pub struct IdentityMap {
    pub directory: PageTable,
    pub table: PageTable,
}

impl IdentityMap {
    pub const fn new() -> Self {
        Self {
            directory: PageTable::zeroed(),
            table: PageTable::zeroed(),
        }
    }

    /// Fill both levels. `table_addr` is the physical address of `self.table`.
    pub fn build(&mut self, table_addr: u32) {
        let present_rw = flags(PageTableFlags::PRESENT | PageTableFlags::WRITABLE);
        let absent_rw = flags(PageTableFlags::WRITABLE);

        for entry in self.directory.entries.iter_mut() {
            *entry = absent_rw;
        }
        for (i, entry) in self.table.entries.iter_mut().enumerate() {
            *entry = (i as u32 * PAGE_SIZE) | present_rw;
        }
        self.directory.entries[0] = (table_addr & !(PAGE_SIZE - 1)) | present_rw;
    }
}

impl Default for IdentityMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
static IDENTITY_MAP: crate::sync::IrqMutex<IdentityMap> = crate::sync::IrqMutex::new(IdentityMap::new());

/// Build the identity map and switch paging on.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn enable_identity_paging() {
    let mut map = IDENTITY_MAP.lock();
    let table_addr = &map.table as *const PageTable as u32;
    map.build(table_addr);
    let directory_addr = &map.directory as *const PageTable as u32;
    // SAFETY: the directory is static, page aligned and maps the low 4 MiB
    // the kernel runs from one to one.
    unsafe { crate::arch::cpu::enable_paging(directory_addr) };
    crate::klog_info!("paging: identity mapped {} KiB", IDENTITY_MAPPED / 1024);
}
