//! Device drivers.
//!
//! - `timer`: 8253/8254 PIT on IRQ0, drives preemption
//! - `ps2_keyboard`: scancode set 1 decoder and input queue on IRQ1

pub mod ps2_keyboard;
pub mod timer;
