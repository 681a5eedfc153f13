//! # Architecture Layer
//!
//! Everything that executes a privileged instruction lives under this module.
//! The rest of the kernel talks to the hardware through [`PortIo`] and the
//! helpers in [`cpu`], which keeps the interrupt, timer and scheduler logic
//! testable on the development host.
//!
//! Real instructions are only emitted for `target_arch = "x86"` with
//! `target_os = "none"`. Hosted builds get inert stand-ins.

pub mod cpu;
pub mod port;

pub use port::PortIo;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use port::HardwarePorts;
