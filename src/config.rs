//! Kernel configuration: compile-time defaults plus command-line overrides.

use crate::log::KlogLevel;
use crate::{klog_debug, klog_warn};

/// Size of the kernel heap region.
pub const HEAP_SIZE: usize = 1024 * 1024;

/// Every process gets one stack of this size from the heap.
pub const PROCESS_STACK_SIZE: u32 = 4096;

/// Capacity of the process arena.
pub const MAX_PROCESSES: usize = 64;

/// Bytes kept for a process name, longer names are truncated.
pub const PROCESS_NAME_LEN: usize = 32;

pub const DEFAULT_TIMER_HZ: u32 = 100;

/// Ticks a process runs before it is preempted (100 ms at 100 Hz).
pub const DEFAULT_QUANTUM_TICKS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub timer_hz: u32,
    pub quantum_ticks: u32,
    pub log_level: KlogLevel,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            timer_hz: DEFAULT_TIMER_HZ,
            quantum_ticks: DEFAULT_QUANTUM_TICKS,
            log_level: KlogLevel::Info,
        }
    }
}

impl KernelConfig {
    /// Defaults overridden by `key=value` tokens from the boot command line.
    ///
    /// Recognized keys are `loglevel`, `timer_hz` and `quantum`. Anything else,
    /// including the kernel image path bootloaders usually put first, is
    /// skipped.
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut config = Self::default();
        for token in cmdline.split_whitespace() {
            config.apply_token(token);
        }
        config
    }

    fn apply_token(&mut self, token: &str) {
        let Some((key, value)) = token.split_once('=') else {
            klog_debug!("cmdline: ignoring '{}'", token);
            return;
        };
        match key {
            "loglevel" => match KlogLevel::parse(value) {
                Some(level) => self.log_level = level,
                None => klog_warn!("cmdline: unknown log level '{}'", value),
            },
            "timer_hz" => match value.parse::<u32>() {
                Ok(hz) if hz > 0 => self.timer_hz = hz,
                _ => klog_warn!("cmdline: bad timer_hz '{}'", value),
            },
            "quantum" => match value.parse::<u32>() {
                Ok(ticks) if ticks > 0 => self.quantum_ticks = ticks,
                _ => klog_warn!("cmdline: bad quantum '{}'", value),
            },
            _ => klog_debug!("cmdline: ignoring key '{}'", key),
        }
    }
}
