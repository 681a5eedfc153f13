#![cfg_attr(target_os = "none", no_std, no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod bare_metal {
    use core::panic::PanicInfo;

    use minikernel::arch::cpu;
    use minikernel::config::KernelConfig;
    use minikernel::interrupts::stubs;
    use minikernel::kernel::panic::kernel_panic;
    use minikernel::kernel::{self, init_kernel, EntryPoints, Kernel};
    use minikernel::{boot, klog_info, klog_warn, log, memory};
    use minikernel::arch::HardwarePorts;

    const MULTIBOOT_HEADER_MAGIC: u32 = 0x1BAD_B002;
    /// Page-align modules and ask for memory information.
    const MULTIBOOT_HEADER_FLAGS: u32 = 0x0000_0003;

    core::arch::global_asm!(
        r#"
.section .multiboot, "a"
.align 4
    .long {magic}
    .long {flags}
    .long {checksum}

.section .bss
.align 16
boot_stack_bottom:
    .skip 65536
boot_stack_top:

.section .text
.global _start
_start:
    mov esp, offset boot_stack_top
    push ebx
    push eax
    call kernel_main
2:
    cli
    hlt
    jmp 2b
"#,
        magic = const MULTIBOOT_HEADER_MAGIC,
        flags = const MULTIBOOT_HEADER_FLAGS,
        checksum = const 0u32.wrapping_sub(MULTIBOOT_HEADER_MAGIC + MULTIBOOT_HEADER_FLAGS),
    );

    extern "C" fn idle_process() {
        loop {
            cpu::halt();
        }
    }

    extern "C" fn counter_process() {
        let kernel = match kernel::kernel() {
            Some(kernel) => kernel,
            None => return,
        };
        for round in 1..=5 {
            klog_info!("counter: round {} at tick {}", round, kernel.ticks());
            kernel.sleep_ms(200);
        }
    }

    extern "C" fn echo_process() {
        let kernel = match kernel::kernel() {
            Some(kernel) => kernel,
            None => return,
        };
        loop {
            while let Some(byte) = kernel.getchar() {
                klog_info!("echo: {:?}", byte as char);
            }
            cpu::halt();
        }
    }

    fn entry_points() -> EntryPoints {
        let stubs = stubs::stub_table();
        EntryPoints {
            exception_stubs: stubs.exceptions,
            irq_stubs: stubs.irqs,
            syscall_stub: stubs.syscall,
            idle: idle_process as usize as u32,
            process_exit: stubs::exit_trampoline(),
        }
    }

    #[no_mangle]
    extern "C" fn kernel_main(magic: u32, info_addr: u32) -> ! {
        log::init_serial();
        if let Err(err) = boot::check_magic(magic) {
            kernel_panic(err);
        }

        // SAFETY: the loader passed this address in ebx and nothing has
        // touched low memory since.
        let boot_info = match unsafe { boot::from_loader(info_addr) } {
            Ok(info) => info,
            Err(err) => kernel_panic(err),
        };
        let config = KernelConfig::from_cmdline(boot_info.cmdline_or_empty());
        log::set_level(config.log_level);
        boot_info.log_summary();

        let heap = match memory::kernel_heap() {
            Ok(heap) => heap,
            Err(err) => kernel_panic(format_args!("Failed to init heap: {}", err)),
        };
        let kernel: &'static Kernel<HardwarePorts> =
            kernel::install(Kernel::new(HardwarePorts, config, heap));

        if let Err(err) = init_kernel(kernel, &entry_points()) {
            kernel_panic(format_args!("Kernel initialization failed: {}", err));
        }

        for (name, entry) in [
            ("counter", counter_process as extern "C" fn()),
            ("echo", echo_process as extern "C" fn()),
        ] {
            if let Err(err) = kernel.create_process(name, entry as usize as u32) {
                klog_warn!("cannot start '{}': {}", name, err);
            }
        }
        kernel.log_process_table();

        klog_info!("kernel: enabling interrupts");
        cpu::enable_interrupts();
        loop {
            cpu::halt();
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        kernel_panic(info)
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("minikernel is a bare-metal image; build it with --target i686-minikernel.json");
}
