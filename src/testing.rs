//! Host-side doubles shared by the unit tests.

use std::collections::VecDeque;
use std::vec::Vec;

use crate::arch::port::IO_WAIT_PORT;
use crate::arch::PortIo;

/// Port bus that records every write and serves scripted reads.
#[derive(Default)]
pub struct RecordingPorts {
    writes: spin::Mutex<Vec<(u16, u8)>>,
    reads: spin::Mutex<VecDeque<(u16, u8)>>,
}

impl RecordingPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` to be returned by the next read of `port`.
    pub fn script_read(&self, port: u16, value: u8) {
        self.reads.lock().push_back((port, value));
    }

    /// Every write so far, minus the I/O delay writes.
    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.writes
            .lock()
            .iter()
            .copied()
            .filter(|&(port, _)| port != IO_WAIT_PORT)
            .collect()
    }

    pub fn writes_to(&self, port: u16) -> Vec<u8> {
        self.writes()
            .into_iter()
            .filter(|&(p, _)| p == port)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn io_waits(&self) -> usize {
        self.writes
            .lock()
            .iter()
            .filter(|&&(port, _)| port == IO_WAIT_PORT)
            .count()
    }

    pub fn clear(&self) {
        self.writes.lock().clear();
    }
}

impl PortIo for RecordingPorts {
    fn read_u8(&self, port: u16) -> u8 {
        let mut reads = self.reads.lock();
        match reads.iter().position(|&(p, _)| p == port) {
            Some(pos) => reads.remove(pos).map(|(_, v)| v).unwrap_or(0),
            None => 0,
        }
    }

    fn write_u8(&self, port: u16, value: u8) {
        self.writes.lock().push((port, value));
    }
}

/// Zeroed memory that lives for the rest of the test run.
pub fn leaked_region(len: usize) -> &'static mut [u8] {
    std::boxed::Box::leak(std::vec![0u8; len].into_boxed_slice())
}
