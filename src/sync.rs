//! Interrupt-safe locking.
//!
//! Kernel state is touched both from interrupt handlers and from code running
//! with interrupts enabled. A plain spin lock taken by process code and then
//! requested by a handler on the same CPU never unlocks, so every shared table
//! sits behind an [`IrqMutex`], which keeps interrupts off while held.

use core::ops::{Deref, DerefMut};

use crate::arch::cpu;

pub struct IrqMutex<T> {
    inner: spin::Mutex<T>,
}

pub struct IrqMutexGuard<'a, T> {
    guard: Option<spin::MutexGuard<'a, T>>,
    restore_interrupts: bool,
}

impl<T> IrqMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }

    pub fn lock(&self) -> IrqMutexGuard<'_, T> {
        let restore_interrupts = cpu::interrupts_enabled();
        if restore_interrupts {
            cpu::disable_interrupts();
        }
        IrqMutexGuard {
            guard: Some(self.inner.lock()),
            restore_interrupts,
        }
    }
}

impl<T> Deref for IrqMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.guard {
            Some(guard) => guard,
            None => unreachable!("guard used after release"),
        }
    }
}

impl<T> DerefMut for IrqMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.guard {
            Some(guard) => guard,
            None => unreachable!("guard used after release"),
        }
    }
}

impl<T> Drop for IrqMutexGuard<'_, T> {
    fn drop(&mut self) {
        // Release the spin lock before interrupts come back on.
        self.guard = None;
        if self.restore_interrupts {
            cpu::enable_interrupts();
        }
    }
}
