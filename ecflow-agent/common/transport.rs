use std::sync::Arc;
use std::time::Duration;

use ecflow_raw::{Direction, RawBus, RawCode};

use crate::common::clock::Delay;
use crate::config::RetryPolicy;
use crate::error::TransportError;

/// Raw bus wrapped with bounded retry and per-register settle delays
///
/// Every component reaches the hardware through this type. It takes
/// `&mut self` and does no locking of its own: the owner serializes access.
pub struct RetryTransport {
    bus: Box<dyn RawBus + Send>,
    policy: RetryPolicy,
    read_settle: Vec<(u8, Duration)>,
    delay: Arc<dyn Delay>,
}

impl RetryTransport {
    pub fn new(bus: Box<dyn RawBus + Send>, policy: RetryPolicy, delay: Arc<dyn Delay>) -> Self {
        Self {
            bus,
            policy,
            read_settle: Vec::new(),
            delay,
        }
    }

    /// Require `settle` after every read of `address`, successful or not
    pub fn with_read_settle(mut self, address: u8, settle: Duration) -> Self {
        self.read_settle.retain(|(addr, _)| *addr != address);
        self.read_settle.push((address, settle));
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn delay(&self) -> Arc<dyn Delay> {
        Arc::clone(&self.delay)
    }

    /// Exchange one register, retrying failed attempts
    ///
    /// Each failed attempt, the last one included, is followed by the retry
    /// delay, so `k` failures block for exactly `k` delays. A failed write
    /// may still have been partially applied by the hardware.
    pub fn exchange(
        &mut self,
        direction: Direction,
        address: u8,
        value: &mut u16,
    ) -> Result<(), TransportError> {
        let attempts = self.policy.attempts.max(1);
        let mut raw_code = 0;

        for attempt in 1..=attempts {
            match self.attempt(direction, address, value) {
                Ok(()) => {
                    self.settle_after(direction, address);
                    return Ok(());
                }
                Err(code) => {
                    raw_code = code;
                    tracing::debug!(
                        "EC {} 0x{:02x} attempt {}/{} failed: {}",
                        direction,
                        address,
                        attempt,
                        attempts,
                        code
                    );
                    self.delay.sleep(self.policy.delay());
                }
            }
        }

        self.settle_after(direction, address);
        tracing::error!("EC {} 0x{:02x} failed: {}", direction, address, raw_code);

        Err(TransportError {
            direction,
            address,
            raw_code,
            attempts,
        })
    }

    /// Exchange one register with a single attempt and no retry delay
    pub fn exchange_once(
        &mut self,
        direction: Direction,
        address: u8,
        value: &mut u16,
    ) -> Result<(), TransportError> {
        let result = self.attempt(direction, address, value);
        self.settle_after(direction, address);

        result.map_err(|raw_code| TransportError {
            direction,
            address,
            raw_code,
            attempts: 1,
        })
    }

    pub fn read(&mut self, address: u8) -> Result<u16, TransportError> {
        let mut value = 0;
        self.exchange(Direction::Read, address, &mut value)?;
        Ok(value)
    }

    pub fn write(&mut self, address: u8, value: u16) -> Result<(), TransportError> {
        let mut value = value;
        self.exchange(Direction::Write, address, &mut value)
    }

    fn attempt(&mut self, direction: Direction, address: u8, value: &mut u16) -> Result<(), RawCode> {
        match direction {
            Direction::Read => {
                *value = self.bus.raw_read(address)?;
                tracing::debug!("EC read: 0x{:02x} = 0x{:04x}", address, *value);
            }
            Direction::Write => {
                self.bus.raw_write(address, *value)?;
                tracing::debug!("EC write: 0x{:02x} <- 0x{:04x}", address, *value);
            }
        }
        Ok(())
    }

    fn settle_after(&self, direction: Direction, address: u8) {
        if direction != Direction::Read {
            return;
        }
        if let Some((_, settle)) = self.read_settle.iter().find(|(addr, _)| *addr == address) {
            self.delay.sleep(*settle);
        }
    }
}
