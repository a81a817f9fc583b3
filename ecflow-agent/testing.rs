//! Deterministic bus and clock doubles shared by the unit tests

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use ecflow_raw::{Direction, RawBus, RawCode};

use crate::common::clock::Delay;
use crate::config::EcConfig;
use crate::ec::Controller;

pub const EIO: RawCode = -5;
pub const ENXIO: RawCode = -6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub direction: Direction,
    pub address: u8,
    pub value: u16,
    pub ok: bool,
}

#[derive(Default)]
struct MockState {
    registers: HashMap<u8, u16>,
    scripted: HashMap<u8, VecDeque<RawCode>>,
    broken: HashMap<u8, RawCode>,
    attempts: Vec<Attempt>,
}

/// In-memory register file with scripted failures
///
/// Clones share state, so a test can keep one handle while the transport
/// owns another.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_register(self, address: u8, value: u16) -> Self {
        self.state.lock().registers.insert(address, value);
        self
    }

    /// Fail the next `times` attempts on `address` with `code`
    pub fn fail_times(&self, address: u8, times: usize, code: RawCode) {
        self.state
            .lock()
            .scripted
            .entry(address)
            .or_default()
            .extend(std::iter::repeat(code).take(times));
    }

    /// Fail every attempt on `address`
    pub fn fail_always(&self, address: u8, code: RawCode) {
        self.state.lock().broken.insert(address, code);
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.state.lock().attempts.clone()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().attempts.len()
    }

    /// Successful writes in order
    pub fn writes(&self) -> Vec<(u8, u16)> {
        self.state
            .lock()
            .attempts
            .iter()
            .filter(|a| a.ok && a.direction == Direction::Write)
            .map(|a| (a.address, a.value))
            .collect()
    }

    pub fn value(&self, address: u8) -> Option<u16> {
        self.state.lock().registers.get(&address).copied()
    }

    fn next_failure(state: &mut MockState, address: u8) -> Option<RawCode> {
        if let Some(code) = state.broken.get(&address) {
            return Some(*code);
        }
        state.scripted.get_mut(&address).and_then(|q| q.pop_front())
    }
}

impl RawBus for MockBus {
    fn raw_read(&mut self, addr: u8) -> Result<u16, RawCode> {
        let mut state = self.state.lock();
        let failure = Self::next_failure(&mut state, addr);
        let value = state.registers.get(&addr).copied().unwrap_or(0);
        state.attempts.push(Attempt {
            direction: Direction::Read,
            address: addr,
            value,
            ok: failure.is_none(),
        });
        match failure {
            Some(code) => Err(code),
            None => Ok(value),
        }
    }

    fn raw_write(&mut self, addr: u8, value: u16) -> Result<(), RawCode> {
        let mut state = self.state.lock();
        let failure = Self::next_failure(&mut state, addr);
        state.attempts.push(Attempt {
            direction: Direction::Write,
            address: addr,
            value,
            ok: failure.is_none(),
        });
        match failure {
            Some(code) => Err(code),
            None => {
                state.registers.insert(addr, value);
                Ok(())
            }
        }
    }
}

/// Delay that records requested waits instead of sleeping
#[derive(Clone, Default)]
pub struct RecordingDelay {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.waits.lock().iter().sum()
    }

    pub fn clear(&self) {
        self.waits.lock().clear();
    }
}

impl Delay for RecordingDelay {
    fn sleep(&self, duration: Duration) {
        self.waits.lock().push(duration);
    }
}

/// A500 controller over a mock bus with recorded delays
pub fn a500_controller(bus: &MockBus, delay: &RecordingDelay) -> Arc<Controller> {
    let config = EcConfig::default();
    let controller = Controller::a500(Box::new(bus.clone()), &config, Arc::new(delay.clone()))
        .expect("A500 register set is valid");
    Arc::new(controller)
}
