//! # Kernel Context
//!
//! [`Kernel`] owns every piece of mutable kernel state: descriptor tables,
//! the handler table, the PIC masks, the heap, the process table and the
//! device state. Interrupt handlers receive a reference to it, so a test can
//! build as many independent kernels as it likes over a recording port bus.
//!
//! ## Submodules
//!
//! - `init`: boot phases and status tracking
//! - `status`: component status table
//! - `panic`: the fatal path
//!
//! ## Locking
//!
//! Each table sits in its own [`IrqMutex`]. When both the heap and the
//! process table are needed, the heap is locked first.

pub mod init;
pub mod panic;
pub mod status;

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::{cpu, PortIo};
use crate::boot::BootError;
use crate::config::KernelConfig;
use crate::drivers::ps2_keyboard::Keyboard;
use crate::drivers::timer::Timer;
use crate::interrupts::gdt::Gdt;
use crate::interrupts::idt::Idt;
use crate::interrupts::{ChainedPics, DispatchOutcome, HandlerTable, InterruptFrame};
use crate::memory::{AllocError, Heap, HeapStats};
use crate::process::{Pid, ProcessError, ProcessInfo, ProcessManager};
use crate::sync::{IrqMutex, IrqMutexGuard};
use crate::{klog_info, klog_warn, kprintln};

pub use init::{init_kernel, EntryPoints};
pub use status::{ComponentStatus, ComponentTable, InitStatus};

/// `eax` value of the exit request made by the process exit trampoline.
pub const SYS_EXIT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    Boot(BootError),
    Alloc(AllocError),
    Process(ProcessError),
}

impl From<BootError> for KernelError {
    fn from(err: BootError) -> Self {
        KernelError::Boot(err)
    }
}

impl From<AllocError> for KernelError {
    fn from(err: AllocError) -> Self {
        KernelError::Alloc(err)
    }
}

impl From<ProcessError> for KernelError {
    fn from(err: ProcessError) -> Self {
        KernelError::Process(err)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Boot(err) => write!(f, "boot: {}", err),
            KernelError::Alloc(err) => write!(f, "heap: {}", err),
            KernelError::Process(err) => write!(f, "process: {}", err),
        }
    }
}

pub struct Kernel<P: PortIo> {
    pub(crate) ports: P,
    config: KernelConfig,
    gdt: Gdt,
    idt: IrqMutex<Idt>,
    pub(crate) handlers: IrqMutex<HandlerTable<P>>,
    pub(crate) pics: IrqMutex<ChainedPics>,
    timer: Timer,
    keyboard: IrqMutex<Keyboard>,
    heap: IrqMutex<Heap>,
    processes: IrqMutex<ProcessManager>,
    components: IrqMutex<ComponentTable>,
    exit_trampoline: AtomicU32,
}

impl<P: PortIo> Kernel<P> {
    pub fn new(ports: P, config: KernelConfig, heap: Heap) -> Self {
        Self {
            ports,
            config,
            gdt: Gdt::new(),
            idt: IrqMutex::new(Idt::new()),
            handlers: IrqMutex::new(HandlerTable::new()),
            pics: IrqMutex::new(ChainedPics::new()),
            timer: Timer::new(config.timer_hz, config.quantum_ticks),
            keyboard: IrqMutex::new(Keyboard::new()),
            heap: IrqMutex::new(heap),
            processes: IrqMutex::new(ProcessManager::new()),
            components: IrqMutex::new(ComponentTable::new()),
            exit_trampoline: AtomicU32::new(0),
        }
    }

    pub fn ports(&self) -> &P {
        &self.ports
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn gdt(&self) -> &Gdt {
        &self.gdt
    }

    pub fn idt(&self) -> IrqMutexGuard<'_, Idt> {
        self.idt.lock()
    }

    pub fn pics(&self) -> IrqMutexGuard<'_, ChainedPics> {
        self.pics.lock()
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn keyboard(&self) -> IrqMutexGuard<'_, Keyboard> {
        self.keyboard.lock()
    }

    pub fn heap(&self) -> IrqMutexGuard<'_, Heap> {
        self.heap.lock()
    }

    pub fn processes(&self) -> IrqMutexGuard<'_, ProcessManager> {
        self.processes.lock()
    }

    pub fn components(&self) -> IrqMutexGuard<'_, ComponentTable> {
        self.components.lock()
    }

    // ------------------------------------------------------------------
    // Heap
    // ------------------------------------------------------------------

    pub fn allocate(&self, size: u32) -> Result<u32, AllocError> {
        self.heap.lock().allocate(size)
    }

    pub fn free(&self, addr: u32) {
        self.heap.lock().free(addr)
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.lock().stats()
    }

    // ------------------------------------------------------------------
    // Processes
    // ------------------------------------------------------------------

    /// Where a process lands when its entry function returns.
    pub fn set_exit_trampoline(&self, addr: u32) {
        self.exit_trampoline.store(addr, Ordering::Relaxed);
    }

    pub fn create_process(&self, name: &str, entry: u32) -> Result<Pid, ProcessError> {
        let exit = self.exit_trampoline.load(Ordering::Relaxed);
        let mut heap = self.heap.lock();
        self.processes.lock().create(&mut heap, name, entry, exit)
    }

    pub fn schedule(&self) -> Option<Pid> {
        self.processes.lock().schedule()
    }

    /// Remove `pid`. If it was running, another process (or the boot
    /// context) is selected before the interrupt return path runs.
    pub fn terminate_process(&self, pid: Pid) -> Result<(), ProcessError> {
        let was_current = {
            let mut heap = self.heap.lock();
            self.processes.lock().terminate(&mut heap, pid)?
        };
        if was_current {
            self.schedule();
        }
        Ok(())
    }

    /// Terminate whatever is running. Returns the pid that exited.
    pub fn exit_current(&self) -> Option<Pid> {
        let pid = self.current_process()?.pid;
        match self.terminate_process(pid) {
            Ok(()) => Some(pid),
            Err(err) => {
                klog_warn!("exit: {}", err);
                None
            }
        }
    }

    pub fn block_process(&self, pid: Pid) -> Result<(), ProcessError> {
        if self.processes.lock().block(pid)? {
            self.schedule();
        }
        Ok(())
    }

    pub fn wake_process(&self, pid: Pid) -> Result<(), ProcessError> {
        self.processes.lock().wake(pid)
    }

    pub fn current_process(&self) -> Option<ProcessInfo> {
        self.processes.lock().current()
    }

    pub fn log_process_table(&self) {
        let processes = self.processes.lock();
        kprintln!("PID\tName\t\tState");
        kprintln!("---\t----\t\t-----");
        for p in processes.enumerate() {
            kprintln!("{}\t{}\t\t{}", p.pid, p.name, p.state.as_str());
        }
        kprintln!("Total: {} processes", processes.count());
    }

    // ------------------------------------------------------------------
    // Interrupts
    // ------------------------------------------------------------------

    /// Full interrupt path: dispatch, then pick the stack to return on.
    /// A stack retired by terminating the interrupted process is released
    /// once the switch has moved off it.
    pub fn handle_interrupt(&self, frame_esp: u32, frame: &mut InterruptFrame) -> u32 {
        if let DispatchOutcome::Fatal(vector) = self.dispatch(frame) {
            panic::fatal_exception(vector, frame);
        }
        let mut heap = self.heap.lock();
        let mut processes = self.processes.lock();
        let esp = processes.switch_stack(frame_esp, frame);
        processes.reap(&mut heap);
        esp
    }

    /// Open `irq` on the controller.
    pub fn enable_irq(&self, irq: u8) {
        self.pics.lock().unmask(&self.ports, irq);
    }

    // ------------------------------------------------------------------
    // Timer and keyboard
    // ------------------------------------------------------------------

    pub fn ticks(&self) -> u64 {
        self.timer.ticks()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.timer.uptime_secs()
    }

    pub fn set_timer_frequency(&self, hz: u32) {
        let divisor = self.timer.program(&self.ports, hz);
        klog_info!("timer: {} Hz (divisor {})", self.timer.frequency(), divisor);
    }

    /// Halt until `ticks` timer interrupts have passed.
    pub fn sleep_ticks(&self, ticks: u64) {
        self.timer.wait_ticks(ticks, cpu::halt);
    }

    pub fn sleep_ms(&self, ms: u32) {
        self.sleep_ticks(self.timer.ms_to_ticks(ms));
    }

    pub fn getchar(&self) -> Option<u8> {
        self.keyboard.lock().getchar()
    }

    pub fn has_input(&self) -> bool {
        self.keyboard.lock().has_data()
    }
}

/// Software vector 0x80. Only the exit request is served here.
pub fn syscall_handler<P: PortIo>(kernel: &Kernel<P>, frame: &mut InterruptFrame) {
    match frame.eax {
        SYS_EXIT => {
            if let Some(pid) = kernel.exit_current() {
                klog_info!("process {} exited with status {}", pid, frame.ebx);
            }
        }
        other => {
            klog_warn!("syscall: unknown request {}", other);
            frame.eax = u32::MAX;
        }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod hardware {
    use super::Kernel;
    use crate::arch::HardwarePorts;
    use crate::interrupts::InterruptFrame;
    use crate::klog_error;

    static KERNEL: spin::Once<Kernel<HardwarePorts>> = spin::Once::new();

    /// Make `kernel` the one the interrupt stubs dispatch to.
    pub fn install(kernel: Kernel<HardwarePorts>) -> &'static Kernel<HardwarePorts> {
        KERNEL.call_once(|| kernel)
    }

    pub fn kernel() -> Option<&'static Kernel<HardwarePorts>> {
        KERNEL.get()
    }

    /// Called by every entry stub with the stack pointer of the saved
    /// frame. Returns the stack pointer to resume from.
    #[no_mangle]
    extern "C" fn interrupt_entry(frame_esp: u32) -> u32 {
        // SAFETY: the stub passes the address of the frame it just pushed.
        let frame = unsafe { &mut *(frame_esp as *mut InterruptFrame) };
        match KERNEL.get() {
            Some(kernel) => kernel.handle_interrupt(frame_esp, frame),
            None => {
                klog_error!("interrupt {} before kernel install", frame.vector);
                frame_esp
            }
        }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use hardware::{install, kernel};
