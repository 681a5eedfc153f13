//! Kernel initialization phases.
//!
//! Each phase is tracked in the kernel's [`ComponentTable`] and logged as it
//! starts and finishes. The first failing phase stops initialization.

use super::status::InitStatus;
use super::{syscall_handler, Kernel, KernelError};
use crate::arch::PortIo;
use crate::drivers::ps2_keyboard::keyboard_interrupt_handler;
use crate::drivers::timer::timer_interrupt_handler;
use crate::interrupts::gdt::KERNEL_CODE_SELECTOR;
use crate::interrupts::idt::{KERNEL_INTERRUPT_GATE, USER_INTERRUPT_GATE};
use crate::interrupts::pic::{PIC_1_OFFSET, SYSCALL_VECTOR};
use crate::interrupts::InterruptIndex;
use crate::{klog_error, klog_info};

/// Addresses of the code the descriptor tables and processes point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoints {
    pub exception_stubs: [u32; 32],
    pub irq_stubs: [u32; 16],
    pub syscall_stub: u32,
    /// Body of the always-ready idle process.
    pub idle: u32,
    /// Where a process entry function returns to.
    pub process_exit: u32,
}

type Phase<P> = fn(&'static Kernel<P>, &EntryPoints) -> Result<(), KernelError>;

/// Initialize kernel in proper order with error handling
pub fn init_kernel<P: PortIo>(
    kernel: &'static Kernel<P>,
    entry: &EntryPoints,
) -> Result<(), KernelError> {
    let phases: [(&'static str, Phase<P>); 7] = [
        ("GDT", init_gdt),
        ("IDT", init_idt),
        ("PIC", init_pic),
        ("Memory", init_memory),
        ("Processes", init_processes),
        ("Timer", init_timer),
        ("Keyboard", init_keyboard),
    ];

    {
        let mut components = kernel.components();
        for &(name, _) in phases.iter() {
            components.register(name);
        }
    }

    klog_info!("kernel: initializing {} components", phases.len());
    for (i, &(name, phase)) in phases.iter().enumerate() {
        klog_info!("[{}/{}] Initializing {}...", i + 1, phases.len(), name);
        init_phase(kernel, entry, name, phase)?;
    }
    log_status_summary(kernel);
    klog_info!("kernel: initialization complete");
    Ok(())
}

/// One line per tracked component.
pub fn log_status_summary<P: PortIo>(kernel: &Kernel<P>) {
    for component in kernel.components().iter() {
        klog_info!("  {:<10} {}", component.name, component.status);
    }
}

fn init_phase<P: PortIo>(
    kernel: &'static Kernel<P>,
    entry: &EntryPoints,
    name: &'static str,
    phase: Phase<P>,
) -> Result<(), KernelError> {
    kernel.components().update(name, InitStatus::InProgress);
    match phase(kernel, entry) {
        Ok(()) => {
            kernel.components().update(name, InitStatus::Completed);
            klog_info!("    {} initialized", name);
            Ok(())
        }
        Err(e) => {
            kernel.components().update(name, InitStatus::Failed);
            klog_error!("    {} failed: {}", name, e);
            Err(e)
        }
    }
}

fn init_gdt<P: PortIo>(kernel: &'static Kernel<P>, _: &EntryPoints) -> Result<(), KernelError> {
    kernel.gdt().load();
    Ok(())
}

fn init_idt<P: PortIo>(kernel: &'static Kernel<P>, entry: &EntryPoints) -> Result<(), KernelError> {
    let mut idt = kernel.idt();
    for (vector, &stub) in entry.exception_stubs.iter().enumerate() {
        idt.set_gate(vector as u8, stub, KERNEL_CODE_SELECTOR, KERNEL_INTERRUPT_GATE);
    }
    for (irq, &stub) in entry.irq_stubs.iter().enumerate() {
        idt.set_gate(PIC_1_OFFSET + irq as u8, stub, KERNEL_CODE_SELECTOR, KERNEL_INTERRUPT_GATE);
    }
    // Reachable with `int 0x80` from ring 3.
    idt.set_gate(SYSCALL_VECTOR, entry.syscall_stub, KERNEL_CODE_SELECTOR, USER_INTERRUPT_GATE);
    // SAFETY: the table lives inside the 'static kernel and every gate set
    // above points at an entry stub.
    unsafe { idt.load() };
    Ok(())
}

fn init_pic<P: PortIo>(kernel: &'static Kernel<P>, _: &EntryPoints) -> Result<(), KernelError> {
    kernel.pics().remap(kernel.ports());
    Ok(())
}

fn init_memory<P: PortIo>(kernel: &'static Kernel<P>, _: &EntryPoints) -> Result<(), KernelError> {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    crate::memory::paging::enable_identity_paging();

    let stats = kernel.heap_stats();
    let heap = kernel.heap();
    klog_info!(
        "heap: {:#x}..{:#x}, {} bytes free in {} block(s)",
        heap.base(),
        heap.end(),
        stats.free,
        stats.blocks
    );
    Ok(())
}

fn init_processes<P: PortIo>(kernel: &'static Kernel<P>, entry: &EntryPoints) -> Result<(), KernelError> {
    kernel.set_exit_trampoline(entry.process_exit);
    kernel.register_handler(SYSCALL_VECTOR, syscall_handler);
    kernel.create_process("idle", entry.idle)?;
    Ok(())
}

fn init_timer<P: PortIo>(kernel: &'static Kernel<P>, _: &EntryPoints) -> Result<(), KernelError> {
    kernel.register_handler(InterruptIndex::Timer.as_u8(), timer_interrupt_handler);
    kernel.timer().set_quantum(kernel.config().quantum_ticks);
    kernel.set_timer_frequency(kernel.config().timer_hz);
    kernel.enable_irq(0);
    Ok(())
}

fn init_keyboard<P: PortIo>(kernel: &'static Kernel<P>, _: &EntryPoints) -> Result<(), KernelError> {
    kernel.register_handler(InterruptIndex::Keyboard.as_u8(), keyboard_interrupt_handler);
    kernel.enable_irq(1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::drivers::timer::{PIT_CHANNEL0, PIT_COMMAND};
    use crate::kernel::testing::{leaked_kernel, TEST_HEAP_BASE};
    use crate::memory::{AllocError, Heap};
    use crate::process::ProcessError;
    use crate::testing::{leaked_region, RecordingPorts};

    fn entry_points() -> EntryPoints {
        let mut entry = EntryPoints {
            exception_stubs: [0; 32],
            irq_stubs: [0; 16],
            syscall_stub: 0x0010_2000,
            idle: 0x0010_3000,
            process_exit: 0x0010_3100,
        };
        for (i, stub) in entry.exception_stubs.iter_mut().enumerate() {
            *stub = 0x0010_1000 + 16 * i as u32;
        }
        for (i, stub) in entry.irq_stubs.iter_mut().enumerate() {
            *stub = 0x0010_1200 + 16 * i as u32;
        }
        entry
    }

    #[test]
    fn all_phases_complete() {
        let kernel = leaked_kernel();
        init_kernel(kernel, &entry_points()).unwrap();

        let components = kernel.components();
        assert!(components.all_ready());
        let names: Vec<_> = components.iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            ["GDT", "IDT", "PIC", "Memory", "Processes", "Timer", "Keyboard"]
        );
    }

    #[test]
    fn gates_cover_exceptions_irqs_and_syscall() {
        let kernel = leaked_kernel();
        init_kernel(kernel, &entry_points()).unwrap();

        let idt = kernel.idt();
        assert_eq!(idt.entry(0).handler(), 0x0010_1000);
        assert_eq!(idt.entry(14).handler(), 0x0010_1000 + 16 * 14);
        assert_eq!(idt.entry(33).handler(), 0x0010_1210);
        assert_eq!(idt.entry(33).flags, KERNEL_INTERRUPT_GATE);
        assert_eq!(idt.entry(0x80).handler(), 0x0010_2000);
        assert_eq!(idt.entry(0x80).flags, USER_INTERRUPT_GATE);
        assert!(!idt.entry(48).is_present());
    }

    #[test]
    fn devices_are_programmed_and_unmasked() {
        let kernel = leaked_kernel();
        init_kernel(kernel, &entry_points()).unwrap();

        assert_eq!(kernel.ports().writes_to(PIT_COMMAND), vec![0x36]);
        assert_eq!(kernel.ports().writes_to(PIT_CHANNEL0), vec![0x9B, 0x2E]);
        assert_eq!(kernel.pics().masks()[0] & 0b11, 0);
        assert_eq!(kernel.handlers.lock().registered(), 3);
    }

    #[test]
    fn idle_process_is_ready() {
        let kernel = leaked_kernel();
        init_kernel(kernel, &entry_points()).unwrap();

        let processes: Vec<_> = kernel.processes().enumerate().collect();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].name.as_str(), "idle");
        assert_eq!(kernel.schedule(), Some(processes[0].pid));
    }

    #[test]
    fn failing_phase_stops_initialization() {
        let heap = Heap::new(TEST_HEAP_BASE, leaked_region(1024)).unwrap();
        let kernel: &'static Kernel<RecordingPorts> = Box::leak(Box::new(Kernel::new(
            RecordingPorts::new(),
            KernelConfig::default(),
            heap,
        )));

        let err = init_kernel(kernel, &entry_points()).unwrap_err();
        assert_eq!(
            err,
            KernelError::Process(ProcessError::OutOfMemory(AllocError::OutOfMemory))
        );

        let components = kernel.components();
        assert_eq!(components.get("Memory").unwrap().status, InitStatus::Completed);
        assert_eq!(components.get("Processes").unwrap().status, InitStatus::Failed);
        assert_eq!(components.get("Timer").unwrap().status, InitStatus::NotStarted);
        assert!(kernel.ports().writes_to(PIT_COMMAND).is_empty());
    }
}
