//! In-memory port and sink used across the unit tests.

use heapless::{Deque, Vec};

use crate::traits::{BusPort, FanMode, StateSink};

/// Loopback port: tests feed the receive side and inspect the transmit
/// side as one flat byte string.
pub struct MockPort {
    rx: Deque<u8, 512>,
    pub tx: Vec<u8, 512>,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            rx: Deque::new(),
            tx: Vec::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.rx.push_back(byte).unwrap();
        }
    }
}

impl Default for MockPort {
    fn default() -> Self {
        Self::new()
    }
}

impl BusPort for MockPort {
    fn available(&self) -> usize {
        self.rx.len()
    }

    fn read(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write(&mut self, byte: u8) {
        self.tx.push(byte).unwrap();
    }
}

/// Sink that records every published change in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    pub modes: Vec<FanMode, 8>,
    pub speeds: Vec<f32, 8>,
    pub watts: Vec<f32, 8>,
    pub filter: Vec<u32, 8>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateSink for RecordingSink {
    fn fan_mode_changed(&mut self, mode: FanMode) {
        self.modes.push(mode).unwrap();
    }

    fn fan_speed_changed(&mut self, percent: f32) {
        self.speeds.push(percent).unwrap();
    }

    fn power_changed(&mut self, watts: f32) {
        self.watts.push(watts).unwrap();
    }

    fn filter_life_changed(&mut self, value: u32) {
        self.filter.push(value).unwrap();
    }
}
