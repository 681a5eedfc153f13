//! Programmable interval timer (8253/8254), channel 0 on IRQ0.
//!
//! The timer is the scheduler's clock: every `quantum` ticks the handler
//! rotates the ready queue.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::arch::PortIo;
use crate::interrupts::InterruptFrame;
use crate::kernel::Kernel;

pub const PIT_FREQUENCY: u32 = 1_193_180;
pub const PIT_CHANNEL0: u16 = 0x40;
pub const PIT_COMMAND: u16 = 0x43;

/// Channel 0, low byte then high byte, mode 3 (square wave), binary.
pub const PIT_SQUARE_WAVE: u8 = 0x36;

/// Slowest rate the 16-bit divisor can produce.
pub const MIN_FREQUENCY: u32 = 18;

pub fn clamp_frequency(hz: u32) -> u32 {
    hz.clamp(MIN_FREQUENCY, PIT_FREQUENCY)
}

/// Reload value for `hz`, already clamped to what the counter holds.
pub fn divisor_for(hz: u32) -> u16 {
    let divisor = PIT_FREQUENCY / clamp_frequency(hz);
    divisor.clamp(1, u32::from(u16::MAX)) as u16
}

pub struct Timer {
    ticks: AtomicU64,
    frequency: AtomicU32,
    quantum: AtomicU32,
}

impl Timer {
    pub const fn new(frequency: u32, quantum: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency: AtomicU32::new(frequency),
            quantum: AtomicU32::new(quantum),
        }
    }

    /// Program channel 0 for `hz` and remember the rate. Returns the divisor
    /// written.
    pub fn program<P: PortIo>(&self, ports: &P, hz: u32) -> u16 {
        let hz = clamp_frequency(hz);
        let divisor = divisor_for(hz);
        ports.write_u8(PIT_COMMAND, PIT_SQUARE_WAVE);
        ports.write_u8(PIT_CHANNEL0, (divisor & 0xFF) as u8);
        ports.write_u8(PIT_CHANNEL0, (divisor >> 8) as u8);
        self.frequency.store(hz, Ordering::Relaxed);
        divisor
    }

    /// Count one interrupt and return the new total.
    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn frequency(&self) -> u32 {
        self.frequency.load(Ordering::Relaxed)
    }

    pub fn quantum(&self) -> u32 {
        self.quantum.load(Ordering::Relaxed)
    }

    pub fn set_quantum(&self, ticks: u32) {
        self.quantum.store(ticks.max(1), Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.ticks() / u64::from(self.frequency().max(1))
    }

    pub fn ms_to_ticks(&self, ms: u32) -> u64 {
        u64::from(ms) * u64::from(self.frequency()) / 1000
    }

    /// Whether tick number `ticks` ends a time slice.
    pub fn ends_quantum(&self, ticks: u64) -> bool {
        ticks % u64::from(self.quantum().max(1)) == 0
    }

    /// Run `idle` until `ticks` more interrupts have arrived.
    pub fn wait_ticks(&self, ticks: u64, mut idle: impl FnMut()) {
        let target = self.ticks().saturating_add(ticks);
        while self.ticks() < target {
            idle();
        }
    }
}

/// IRQ0 handler. Interrupts are acknowledged by dispatch before this runs.
pub fn timer_interrupt_handler<P: PortIo>(kernel: &Kernel<P>, _frame: &mut InterruptFrame) {
    let timer = kernel.timer();
    let ticks = timer.tick();
    if timer.ends_quantum(ticks) {
        kernel.schedule();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPorts;

    #[test]
    fn divisor_for_common_rates() {
        assert_eq!(divisor_for(100), 11931);
        assert_eq!(divisor_for(1000), 1193);
        assert_eq!(divisor_for(PIT_FREQUENCY), 1);
    }

    #[test]
    fn frequency_is_clamped() {
        assert_eq!(clamp_frequency(1), 18);
        assert_eq!(clamp_frequency(5_000_000), PIT_FREQUENCY);
        assert_eq!(divisor_for(0), divisor_for(18));
        assert_eq!(divisor_for(18), 0xFFFF);
    }

    #[test]
    fn program_writes_mode_then_divisor_bytes() {
        let ports = RecordingPorts::new();
        let timer = Timer::new(100, 10);
        let divisor = timer.program(&ports, 100);
        assert_eq!(divisor, 0x2E9B);
        assert_eq!(
            ports.writes(),
            vec![(0x43, 0x36), (0x40, 0x9B), (0x40, 0x2E)]
        );

        timer.program(&ports, 5);
        assert_eq!(timer.frequency(), 18);
    }

    #[test]
    fn uptime_and_quantum_follow_ticks() {
        let timer = Timer::new(100, 10);
        for _ in 0..250 {
            timer.tick();
        }
        assert_eq!(timer.ticks(), 250);
        assert_eq!(timer.uptime_secs(), 2);
        assert!(timer.ends_quantum(250));
        assert!(!timer.ends_quantum(251));
        assert_eq!(timer.ms_to_ticks(1500), 150);
    }

    #[test]
    fn wait_ticks_idles_until_target() {
        let timer = Timer::new(100, 10);
        let mut idles = 0;
        timer.wait_ticks(3, || {
            idles += 1;
            timer.tick();
        });
        assert_eq!(idles, 3);
        assert_eq!(timer.ticks(), 3);
    }
}
