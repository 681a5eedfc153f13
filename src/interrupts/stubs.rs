//! Assembly entry points for every installed vector.
//!
//! Each stub makes the stack look the same whether or not the CPU pushed an
//! error code, then hands the frame to the kernel:
//!
//! 1. push a zero error code (only for vectors without one)
//! 2. push the vector number
//! 3. `pushad`, then call `interrupt_entry(esp)`
//! 4. switch to the stack pointer it returns, `popad`, drop vector and
//!    error code, `iretd`
//!
//! Step 4 is where a context switch happens: returning a different stack
//! pointer resumes a different process.

/// Entry stub addresses, as installed in the IDT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubTable {
    pub exceptions: [u32; 32],
    pub irqs: [u32; 16],
    pub syscall: u32,
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod imp {
    use super::StubTable;

    core::arch::global_asm!(
        r#"
.macro ISR_NOERR n
    .global isr\n
isr\n:
    push 0
    push \n
    jmp interrupt_common
.endm

.macro ISR_ERR n
    .global isr\n
isr\n:
    push \n
    jmp interrupt_common
.endm

.section .text
.irp n, 0,1,2,3,4,5,6,7,9,15,16,18,19,20,22,23,24,25,26,27,28,31
    ISR_NOERR \n
.endr
.irp n, 8,10,11,12,13,14,17,21,29,30
    ISR_ERR \n
.endr
.irp n, 32,33,34,35,36,37,38,39,40,41,42,43,44,45,46,47,128
    ISR_NOERR \n
.endr

interrupt_common:
    pushad
    cld
    push esp
    call interrupt_entry
    mov esp, eax
    popad
    add esp, 8
    iretd

.global process_exit_trampoline
process_exit_trampoline:
    mov ebx, eax
    mov eax, 1
    int 0x80
2:
    hlt
    jmp 2b

.section .rodata
.balign 4
.global interrupt_stub_table
interrupt_stub_table:
.irp n, 0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,23,24,25,26,27,28,29,30,31
    .long isr\n
.endr
.irp n, 32,33,34,35,36,37,38,39,40,41,42,43,44,45,46,47
    .long isr\n
.endr
    .long isr128
.section .text
"#
    );

    extern "C" {
        static interrupt_stub_table: [u32; 49];
        fn process_exit_trampoline();
    }

    pub fn stub_table() -> StubTable {
        // SAFETY: the table is immutable data emitted by the assembly above.
        let raw = unsafe { &*core::ptr::addr_of!(interrupt_stub_table) };
        let mut table = StubTable {
            exceptions: [0; 32],
            irqs: [0; 16],
            syscall: raw[48],
        };
        table.exceptions.copy_from_slice(&raw[..32]);
        table.irqs.copy_from_slice(&raw[32..48]);
        table
    }

    pub fn exit_trampoline() -> u32 {
        process_exit_trampoline as usize as u32
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use imp::{exit_trampoline, stub_table};
