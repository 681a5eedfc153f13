//! Byte-wide I/O port access.

/// Port used for the classic "wait one I/O cycle" write.
pub const IO_WAIT_PORT: u16 = 0x80;

/// Access to the x86 I/O port space.
///
/// Methods take `&self`: a port write is a side effect on the machine, not on
/// the value implementing this trait.
pub trait PortIo {
    fn read_u8(&self, port: u16) -> u8;

    fn write_u8(&self, port: u16, value: u8);

    /// Give slow devices (the 8259 in particular) time to settle between
    /// command words.
    fn io_wait(&self) {
        self.write_u8(IO_WAIT_PORT, 0);
    }
}

/// The machine's real port space.
#[cfg(all(target_arch = "x86", target_os = "none"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwarePorts;

#[cfg(all(target_arch = "x86", target_os = "none"))]
impl PortIo for HardwarePorts {
    #[inline]
    fn read_u8(&self, port: u16) -> u8 {
        let value: u8;
        unsafe {
            core::arch::asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    #[inline]
    fn write_u8(&self, port: u16, value: u8) {
        unsafe {
            core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }
}
