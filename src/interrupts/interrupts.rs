//! Handler registration and dispatch.
//!
//! Every stub funnels into [`Kernel::dispatch`] with the saved
//! [`InterruptFrame`]. Dispatch picks the route by vector range:
//!
//! | Vectors | Route                  | Without a handler                |
//! |---------|------------------------|----------------------------------|
//! | 0-31    | `dispatch_exception`   | logged, fatal kinds panic        |
//! | 32-47   | `dispatch_irq`         | acknowledged, otherwise ignored  |
//! | 48-255  | software               | logged                           |

use crate::arch::PortIo;
use crate::interrupts::frame::InterruptFrame;
use crate::interrupts::pic::{IRQ_VECTOR_END, PIC_1_OFFSET};
use crate::kernel::Kernel;
use crate::{klog_debug, klog_error, klog_warn};

pub const HANDLER_SLOTS: usize = 256;

/// Callback run for one vector. It gets the kernel it was registered on and
/// may edit the saved registers.
pub type HandlerFn<P> = fn(&Kernel<P>, &mut InterruptFrame);

pub enum HandlerSlot<P: PortIo> {
    Unset,
    Handler(HandlerFn<P>),
}

// Manual impls: a derive would demand `P: Copy`.
impl<P: PortIo> Clone for HandlerSlot<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: PortIo> Copy for HandlerSlot<P> {}

impl<P: PortIo> HandlerSlot<P> {
    pub fn is_set(&self) -> bool {
        matches!(self, HandlerSlot::Handler(_))
    }
}

pub struct HandlerTable<P: PortIo> {
    slots: [HandlerSlot<P>; HANDLER_SLOTS],
}

impl<P: PortIo> HandlerTable<P> {
    pub const fn new() -> Self {
        Self {
            slots: [HandlerSlot::Unset; HANDLER_SLOTS],
        }
    }

    pub fn set(&mut self, vector: u8, handler: HandlerFn<P>) {
        self.slots[vector as usize] = HandlerSlot::Handler(handler);
    }

    pub fn get(&self, vector: u8) -> HandlerSlot<P> {
        self.slots[vector as usize]
    }

    pub fn registered(&self) -> usize {
        self.slots.iter().filter(|s| s.is_set()).count()
    }
}

impl<P: PortIo> Default for HandlerTable<P> {
    fn default() -> Self {
        Self::new()
    }
}

const EXCEPTION_NAMES: [&str; 32] = [
    "Division By Zero",
    "Debug",
    "Non Maskable Interrupt",
    "Breakpoint",
    "Into Detected Overflow",
    "Out of Bounds",
    "Invalid Opcode",
    "No Coprocessor",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack Fault",
    "General Protection Fault",
    "Page Fault",
    "Unknown Interrupt",
    "x87 Floating-Point Exception",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point Exception",
    "Virtualization Exception",
    "Control Protection Exception",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Hypervisor Injection Exception",
    "VMM Communication Exception",
    "Security Exception",
    "Reserved",
];

pub const DOUBLE_FAULT: u8 = 8;
pub const INVALID_TSS: u8 = 10;
pub const SEGMENT_NOT_PRESENT: u8 = 11;
pub const STACK_FAULT: u8 = 12;
pub const GENERAL_PROTECTION_FAULT: u8 = 13;
pub const PAGE_FAULT: u8 = 14;
pub const MACHINE_CHECK: u8 = 18;

pub fn exception_name(vector: u8) -> &'static str {
    EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("Not An Exception")
}

/// Exceptions execution cannot continue after unless a handler fixes things.
pub fn is_fatal(vector: u8) -> bool {
    matches!(
        vector,
        DOUBLE_FAULT
            | INVALID_TSS
            | SEGMENT_NOT_PRESENT
            | STACK_FAULT
            | GENERAL_PROTECTION_FAULT
            | PAGE_FAULT
            | MACHINE_CHECK
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Unhandled,
    /// Unhandled exception of a fatal kind. The caller must take the panic
    /// path.
    Fatal(u8),
}

impl<P: PortIo> Kernel<P> {
    /// Install `handler` for `vector`, replacing any earlier one.
    pub fn register_handler(&self, vector: u8, handler: HandlerFn<P>) {
        self.handlers.lock().set(vector, handler);
        klog_debug!("interrupts: handler registered for vector {}", vector);
    }

    pub fn handler(&self, vector: u8) -> HandlerSlot<P> {
        self.handlers.lock().get(vector)
    }

    /// Route `frame` by its vector.
    pub fn dispatch(&self, frame: &mut InterruptFrame) -> DispatchOutcome {
        match frame.vector() {
            0..=31 => self.dispatch_exception(frame),
            PIC_1_OFFSET..=47 => self.dispatch_irq(frame),
            _ => self.dispatch_software(frame),
        }
    }

    /// CPU exception: run the handler, otherwise report it.
    pub fn dispatch_exception(&self, frame: &mut InterruptFrame) -> DispatchOutcome {
        let vector = frame.vector();
        if self.invoke(vector, frame) {
            return DispatchOutcome::Handled;
        }

        if is_fatal(vector) {
            klog_error!(
                "Unhandled ISR: {} ({}), error code {:#x}, eip {:#010x}",
                vector,
                exception_name(vector),
                frame.error_code,
                frame.eip
            );
            DispatchOutcome::Fatal(vector)
        } else {
            klog_warn!(
                "Unhandled ISR: {} ({}), error code {:#x}",
                vector,
                exception_name(vector),
                frame.error_code
            );
            DispatchOutcome::Unhandled
        }
    }

    /// Hardware interrupt: acknowledge first, then run the handler if any.
    pub fn dispatch_irq(&self, frame: &mut InterruptFrame) -> DispatchOutcome {
        let vector = frame.vector();
        debug_assert!((PIC_1_OFFSET..IRQ_VECTOR_END).contains(&vector));
        self.pics.lock().notify_end_of_interrupt(&self.ports, vector);

        if self.invoke(vector, frame) {
            DispatchOutcome::Handled
        } else {
            DispatchOutcome::Unhandled
        }
    }

    fn dispatch_software(&self, frame: &mut InterruptFrame) -> DispatchOutcome {
        let vector = frame.vector();
        if self.invoke(vector, frame) {
            return DispatchOutcome::Handled;
        }
        klog_warn!("interrupts: no handler for software vector {:#x}", vector);
        DispatchOutcome::Unhandled
    }

    /// Run the handler for `vector`. The table lock is released before the
    /// call so the handler can register others.
    fn invoke(&self, vector: u8, frame: &mut InterruptFrame) -> bool {
        let slot = self.handlers.lock().get(vector);
        match slot {
            HandlerSlot::Handler(handler) => {
                handler(self, frame);
                true
            }
            HandlerSlot::Unset => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::testing::test_kernel;
    use crate::testing::RecordingPorts;

    fn frame(vector: u8) -> InterruptFrame {
        InterruptFrame {
            vector: vector.into(),
            ..InterruptFrame::default()
        }
    }

    fn mark_eax(_: &Kernel<RecordingPorts>, frame: &mut InterruptFrame) {
        frame.eax = 0xAAAA;
    }

    fn mark_ebx(_: &Kernel<RecordingPorts>, frame: &mut InterruptFrame) {
        frame.ebx = 0xBBBB;
    }

    #[test]
    fn registered_handler_runs_for_its_vector_only() {
        let kernel = test_kernel();
        kernel.register_handler(3, mark_eax);
        kernel.register_handler(0x80, mark_ebx);

        let mut f = frame(3);
        assert_eq!(kernel.dispatch(&mut f), DispatchOutcome::Handled);
        assert_eq!((f.eax, f.ebx), (0xAAAA, 0));

        let mut f = frame(0x80);
        assert_eq!(kernel.dispatch(&mut f), DispatchOutcome::Handled);
        assert_eq!((f.eax, f.ebx), (0, 0xBBBB));
    }

    #[test]
    fn registration_overwrites() {
        let kernel = test_kernel();
        kernel.register_handler(50, mark_eax);
        kernel.register_handler(50, mark_ebx);
        let mut f = frame(50);
        kernel.dispatch(&mut f);
        assert_eq!((f.eax, f.ebx), (0, 0xBBBB));
    }

    #[test]
    fn unhandled_exceptions_continue_unless_fatal() {
        let kernel = test_kernel();
        assert_eq!(kernel.dispatch(&mut frame(0)), DispatchOutcome::Unhandled);
        assert_eq!(kernel.dispatch(&mut frame(3)), DispatchOutcome::Unhandled);
        for v in [8, 10, 11, 12, 13, 14, 18] {
            assert_eq!(kernel.dispatch(&mut frame(v)), DispatchOutcome::Fatal(v));
        }
        kernel.register_handler(14, mark_eax);
        assert_eq!(kernel.dispatch(&mut frame(14)), DispatchOutcome::Handled);
    }

    #[test]
    fn irq_eoi_goes_to_secondary_only_from_vector_40() {
        let kernel = test_kernel();
        for vector in 32..48u8 {
            kernel.ports().clear();
            kernel.dispatch(&mut frame(vector));
            let expected = if vector >= 40 {
                vec![(0xA0, 0x20), (0x20, 0x20)]
            } else {
                vec![(0x20, 0x20)]
            };
            assert_eq!(kernel.ports().writes(), expected, "vector {}", vector);
        }
    }

    #[test]
    fn irq_is_acknowledged_before_the_handler_runs() {
        fn check_ack(kernel: &Kernel<RecordingPorts>, frame: &mut InterruptFrame) {
            frame.eax = kernel.ports().writes().len() as u32;
        }
        let kernel = test_kernel();
        kernel.register_handler(44, check_ack);
        kernel.ports().clear();
        let mut f = frame(44);
        assert_eq!(kernel.dispatch(&mut f), DispatchOutcome::Handled);
        assert_eq!(f.eax, 2);
    }

    #[test]
    fn unregistered_software_vector_is_reported() {
        let kernel = test_kernel();
        assert_eq!(kernel.dispatch(&mut frame(0x90)), DispatchOutcome::Unhandled);
    }

    #[test]
    fn exception_metadata() {
        assert_eq!(exception_name(14), "Page Fault");
        assert_eq!(exception_name(200), "Not An Exception");
        assert!(!is_fatal(6));
    }
}
