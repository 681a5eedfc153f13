//! The one way down: interrupts off, banner out, halt.

use core::fmt::{self, Write};

use crate::arch::cpu;
use crate::format::FixedStr;
use crate::interrupts::interrupts::exception_name;
use crate::interrupts::InterruptFrame;
use crate::kprintln;

const BANNER_CAPACITY: usize = 512;

pub fn render_panic_banner<W: Write>(out: &mut W, message: impl fmt::Display) -> fmt::Result {
    write!(out, "KERNEL PANIC: {}\n\nSystem halted.", message)
}

/// Stop the machine after printing `message`.
pub fn kernel_panic(message: impl fmt::Display) -> ! {
    cpu::disable_interrupts();
    let mut banner = FixedStr::<BANNER_CAPACITY>::new();
    let _ = render_panic_banner(&mut banner, message);
    kprintln!("{}", banner);
    cpu::halt_forever()
}

/// Panic for an exception nothing handled and execution cannot survive.
pub fn fatal_exception(vector: u8, frame: &InterruptFrame) -> ! {
    kernel_panic(format_args!(
        "{} (vector {}, error code {:#x}) at {:#010x}",
        exception_name(vector),
        vector,
        frame.error_code,
        frame.eip
    ))
}
