//! Raw single-register exchange primitive
//!
//! The bus layer below this trait owns the wire framing. Everything above it
//! sees one register address and one 16-bit word per exchange.

use std::fmt;

/// Raw error code reported by the bus layer (negative errno on Linux)
pub type RawCode = i32;

/// Direction of a single register exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// A bus able to read and write one register word at a time
///
/// Implementations are not expected to be reentrant: callers hold exclusive
/// access for the duration of each call.
pub trait RawBus {
    /// Read the word stored at `addr`
    fn raw_read(&mut self, addr: u8) -> Result<u16, RawCode>;

    /// Write `value` to the register at `addr`
    fn raw_write(&mut self, addr: u8, value: u16) -> Result<(), RawCode>;
}

impl<B: RawBus + ?Sized> RawBus for Box<B> {
    fn raw_read(&mut self, addr: u8) -> Result<u16, RawCode> {
        (**self).raw_read(addr)
    }

    fn raw_write(&mut self, addr: u8, value: u16) -> Result<(), RawCode> {
        (**self).raw_write(addr, value)
    }
}

impl<B: RawBus + ?Sized> RawBus for &mut B {
    fn raw_read(&mut self, addr: u8) -> Result<u16, RawCode> {
        (**self).raw_read(addr)
    }

    fn raw_write(&mut self, addr: u8, value: u16) -> Result<(), RawCode> {
        (**self).raw_write(addr, value)
    }
}
