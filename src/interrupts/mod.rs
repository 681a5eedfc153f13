//! # Interrupt Handling Module
//!
//! Interrupt infrastructure for the kernel:
//!
//! - **GDT**: flat kernel and user segments
//! - **IDT**: 256 gates pointing at the assembly stubs
//! - **PIC**: 8259 remapping, masking and end-of-interrupt
//! - **Dispatch**: registered callbacks, looked up per vector
//!
//! ## Interrupt Vector Layout
//!
//! | Vector | Type                   | Handler                    |
//! |--------|------------------------|----------------------------|
//! | 0-31   | CPU Exceptions         | registered or reported     |
//! | 32     | Timer (IRQ0)           | `drivers::timer`           |
//! | 33     | Keyboard (IRQ1)        | `drivers::ps2_keyboard`    |
//! | 0x80   | Syscall                | process exit               |

pub mod frame;
pub mod gdt;
pub mod idt;
#[allow(clippy::module_inception)]
pub mod interrupts;
pub mod pic;
pub mod stubs;

pub use frame::InterruptFrame;
pub use interrupts::{DispatchOutcome, HandlerFn, HandlerSlot, HandlerTable};
pub use pic::{ChainedPics, InterruptIndex};
