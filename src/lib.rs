//! A small preemptive kernel for 32-bit x86.
//!
//! Boot hands control to `kernel_main` in the binary, which builds a
//! [`kernel::Kernel`] and runs [`kernel::init_kernel`]. From then on the
//! timer interrupt rotates the ready queue and the interrupt return path
//! switches stacks.
//!
//! Everything except the code under [`arch`] and the assembly stubs is plain
//! Rust over a [`arch::PortIo`] bus, so the library also builds and tests on
//! the development host.

#![cfg_attr(not(test), no_std)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
extern crate rlibc;

pub mod log;

pub mod arch;
pub mod boot;
pub mod config;
pub mod data_structures;
pub mod drivers;
pub mod format;
pub mod interrupts;
pub mod kernel;
pub mod memory;
pub mod process;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;
