//! Multiboot (v1) hand-off.
//!
//! The bootloader jumps to `_start` with the magic value in `eax` and the
//! physical address of a [`MultibootInfo`] block in `ebx`. Which fields of
//! the block are valid is announced by its `flags` word.

use core::fmt;

use crate::klog_info;

/// Value a compliant loader leaves in `eax`.
pub const MULTIBOOT_BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

pub const INFO_MEMORY: u32 = 1 << 0;
pub const INFO_BOOT_DEVICE: u32 = 1 << 1;
pub const INFO_CMDLINE: u32 = 1 << 2;
pub const INFO_MODULES: u32 = 1 << 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    BadMagic(u32),
    MissingInfo,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::BadMagic(magic) => write!(f, "Invalid multiboot magic number {:#010x}", magic),
            BootError::MissingInfo => f.write_str("no multiboot information block"),
        }
    }
}

pub fn check_magic(magic: u32) -> Result<(), BootError> {
    if magic == MULTIBOOT_BOOTLOADER_MAGIC {
        Ok(())
    } else {
        Err(BootError::BadMagic(magic))
    }
}

/// Boot information block exactly as the loader lays it out.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct MultibootInfo {
    pub flags: u32,
    pub mem_lower: u32,
    pub mem_upper: u32,
    pub boot_device: u32,
    pub cmdline: u32,
    pub mods_count: u32,
    pub mods_addr: u32,
    pub syms: [u32; 4],
    pub mmap_length: u32,
    pub mmap_addr: u32,
    pub drives_length: u32,
    pub drives_addr: u32,
    pub config_table: u32,
    pub boot_loader_name: u32,
    pub apm_table: u32,
    pub vbe_control_info: u32,
    pub vbe_mode_info: u32,
    pub vbe_mode: u16,
    pub vbe_interface_seg: u16,
    pub vbe_interface_off: u16,
    pub vbe_interface_len: u16,
}

impl MultibootInfo {
    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleList {
    pub count: u32,
    pub addr: u32,
}

/// The parts of the boot block the kernel uses, flag-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootInfo<'a> {
    /// Lower and upper memory in KiB.
    pub memory_kb: Option<(u32, u32)>,
    pub boot_device: Option<u32>,
    pub cmdline: Option<&'a str>,
    pub modules: Option<ModuleList>,
}

impl<'a> BootInfo<'a> {
    /// Pick out the valid fields. `resolve_cmdline` turns the command-line
    /// address into text.
    pub fn from_multiboot(
        info: &MultibootInfo,
        resolve_cmdline: impl FnOnce(u32) -> Option<&'a str>,
    ) -> Self {
        Self {
            memory_kb: info
                .has(INFO_MEMORY)
                .then_some((info.mem_lower, info.mem_upper)),
            boot_device: info.has(INFO_BOOT_DEVICE).then_some(info.boot_device),
            cmdline: if info.has(INFO_CMDLINE) && info.cmdline != 0 {
                resolve_cmdline(info.cmdline)
            } else {
                None
            },
            modules: info.has(INFO_MODULES).then_some(ModuleList {
                count: info.mods_count,
                addr: info.mods_addr,
            }),
        }
    }

    pub fn cmdline_or_empty(&self) -> &'a str {
        self.cmdline.unwrap_or("")
    }

    pub fn log_summary(&self) {
        match self.memory_kb {
            Some((lower, upper)) => klog_info!("boot: memory {} KB lower, {} KB upper", lower, upper),
            None => klog_info!("boot: memory sizes not provided"),
        }
        if let Some(device) = self.boot_device {
            klog_info!("boot: boot device {:#x}", device);
        }
        if let Some(cmdline) = self.cmdline {
            klog_info!("boot: command line '{}'", cmdline);
        }
        if let Some(modules) = self.modules {
            klog_info!("boot: {} module(s) at {:#x}", modules.count, modules.addr);
        }
    }
}

/// Read the loader's block at physical address `info_addr`.
///
/// # Safety
/// `info_addr` must be the address the loader passed in `ebx`, still
/// identity mapped and unmodified.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub unsafe fn from_loader(info_addr: u32) -> Result<BootInfo<'static>, BootError> {
    if info_addr == 0 {
        return Err(BootError::MissingInfo);
    }
    let info = &*(info_addr as *const MultibootInfo);
    Ok(BootInfo::from_multiboot(info, |addr| {
        core::ffi::CStr::from_ptr(addr as *const core::ffi::c_char)
            .to_str()
            .ok()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_must_match() {
        assert_eq!(check_magic(0x2BAD_B002), Ok(()));
        assert_eq!(check_magic(0x1BAD_B002), Err(BootError::BadMagic(0x1BAD_B002)));
    }

    #[test]
    fn only_flagged_fields_are_used() {
        let info = MultibootInfo {
            flags: INFO_MEMORY | INFO_CMDLINE,
            mem_lower: 639,
            mem_upper: 130_048,
            boot_device: 0x8000_FFFF,
            cmdline: 0x0001_0000,
            ..MultibootInfo::default()
        };
        let boot = BootInfo::from_multiboot(&info, |addr| {
            assert_eq!(addr, 0x0001_0000);
            Some("/kernel loglevel=debug")
        });
        assert_eq!(boot.memory_kb, Some((639, 130_048)));
        assert_eq!(boot.boot_device, None);
        assert_eq!(boot.cmdline, Some("/kernel loglevel=debug"));
        assert_eq!(boot.modules, None);
    }

    #[test]
    fn empty_block_yields_nothing() {
        let boot = BootInfo::from_multiboot(&MultibootInfo::default(), |_| Some("unused"));
        assert_eq!(boot, BootInfo::default());
        assert_eq!(boot.cmdline_or_empty(), "");
    }

    #[test]
    fn struct_matches_loader_layout() {
        assert_eq!(core::mem::size_of::<MultibootInfo>(), 88);
    }
}
