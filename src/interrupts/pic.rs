//! # Programmable Interrupt Controller (8259 PIC)
//!
//! Configures the legacy 8259 PIC pair for interrupt routing.
//!
//! ## PIC Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Primary)  │◀────│ (Secondary) │
//! │ IRQ 0-7     │ IR2 │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! ## Vector Remapping
//!
//! Out of reset IRQ 0-7 land on CPU exception vectors, so both chips are
//! reprogrammed:
//! - PIC 1: vectors 32-39 (IRQ 0-7)
//! - PIC 2: vectors 40-47 (IRQ 8-15)
//!
//! ## Interrupt Assignments
//!
//! | IRQ | Vector | Device    |
//! |-----|--------|-----------|
//! | 0   | 32     | Timer     |
//! | 1   | 33     | Keyboard  |
//! | -   | 0x80   | Syscall   |

use crate::arch::PortIo;

pub const PIC_1_OFFSET: u8 = 0x20; // Primary PIC handles IRQs 0-7
pub const PIC_2_OFFSET: u8 = 0x28; // Secondary PIC handles IRQs 8-15
pub const SYSCALL_VECTOR: u8 = 0x80;

pub const PIC_1_COMMAND: u16 = 0x20;
pub const PIC_1_DATA: u16 = 0x21;
pub const PIC_2_COMMAND: u16 = 0xA0;
pub const PIC_2_DATA: u16 = 0xA1;

const ICW1_INIT_WITH_ICW4: u8 = 0x11;
/// IR line on the primary that the secondary is wired to.
const CASCADE_IRQ: u8 = 2;
const ICW3_PRIMARY: u8 = 1 << CASCADE_IRQ;
const ICW3_SECONDARY: u8 = CASCADE_IRQ;
const ICW4_8086: u8 = 0x01;
const END_OF_INTERRUPT: u8 = 0x20;

pub const IRQ_VECTOR_END: u8 = PIC_1_OFFSET + 16;

// Interrupt indices - these are the actual vector numbers the CPU sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,        // 32 - IRQ0
    Keyboard = PIC_1_OFFSET + 1, // 33 - IRQ1
    Syscall = SYSCALL_VECTOR,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Controller line, for the hardware entries.
    pub fn irq(self) -> Option<u8> {
        irq_of(self.as_u8())
    }
}

/// IRQ line behind a remapped vector.
pub fn irq_of(vector: u8) -> Option<u8> {
    (PIC_1_OFFSET..IRQ_VECTOR_END)
        .contains(&vector)
        .then(|| vector - PIC_1_OFFSET)
}

pub fn is_secondary_vector(vector: u8) -> bool {
    (PIC_2_OFFSET..IRQ_VECTOR_END).contains(&vector)
}

/// Both 8259s plus the masks last written to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainedPics {
    masks: [u8; 2],
}

impl ChainedPics {
    /// All lines masked, matching what [`remap`](Self::remap) programs.
    pub const fn new() -> Self {
        Self { masks: [0xFF, 0xFF] }
    }

    /// Run the four-word init sequence on both chips and mask every line.
    pub fn remap<P: PortIo>(&mut self, ports: &P) {
        let words = [
            (ICW1_INIT_WITH_ICW4, ICW1_INIT_WITH_ICW4),
            (PIC_1_OFFSET, PIC_2_OFFSET),
            (ICW3_PRIMARY, ICW3_SECONDARY),
            (ICW4_8086, ICW4_8086),
        ];
        for (i, (primary, secondary)) in words.into_iter().enumerate() {
            // ICW1 goes to the command port, the rest to the data port.
            let (p1, p2) = if i == 0 {
                (PIC_1_COMMAND, PIC_2_COMMAND)
            } else {
                (PIC_1_DATA, PIC_2_DATA)
            };
            ports.write_u8(p1, primary);
            ports.io_wait();
            ports.write_u8(p2, secondary);
            ports.io_wait();
        }

        self.masks = [0xFF, 0xFF];
        self.write_masks(ports);
    }

    /// Let `irq` through. Lines on the secondary also open the cascade line.
    pub fn unmask<P: PortIo>(&mut self, ports: &P, irq: u8) {
        let irq = irq & 0x0F;
        if irq >= 8 {
            self.masks[1] &= !(1 << (irq - 8));
            self.masks[0] &= !(1 << CASCADE_IRQ);
        } else {
            self.masks[0] &= !(1 << irq);
        }
        self.write_masks(ports);
    }

    pub fn mask<P: PortIo>(&mut self, ports: &P, irq: u8) {
        let irq = irq & 0x0F;
        if irq >= 8 {
            self.masks[1] |= 1 << (irq - 8);
        } else {
            self.masks[0] |= 1 << irq;
        }
        self.write_masks(ports);
    }

    pub fn masks(&self) -> [u8; 2] {
        self.masks
    }

    /// Acknowledge `vector`: the secondary first when it raised the line,
    /// then always the primary.
    pub fn notify_end_of_interrupt<P: PortIo>(&self, ports: &P, vector: u8) {
        if vector >= PIC_2_OFFSET {
            ports.write_u8(PIC_2_COMMAND, END_OF_INTERRUPT);
        }
        ports.write_u8(PIC_1_COMMAND, END_OF_INTERRUPT);
    }

    fn write_masks<P: PortIo>(&self, ports: &P) {
        ports.write_u8(PIC_1_DATA, self.masks[0]);
        ports.write_u8(PIC_2_DATA, self.masks[1]);
    }
}

impl Default for ChainedPics {
    fn default() -> Self {
        Self::new()
    }
}
