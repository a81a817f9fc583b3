//! # ecflow-raw
//!
//! Register definitions and raw bus access for embedded controllers.
//!
//! This crate provides type-safe register descriptors, register map
//! configuration, the raw single-register exchange primitive, and
//! board-specific constants for the controllers supported by ecflow.
//!
//! ## Features
//!
//! Select the target board via feature flags:
//! - `a500` (default) - Acer Iconia Tab A500 (KB930) definitions
//!
//! ## Usage
//!
//! ```ignore
//! use ecflow_raw::current_board::{reg, REGMAP};
//! use ecflow_raw::{RawBus, SmbusDevice};
//!
//! let mut bus = SmbusDevice::open("/dev/i2c-0", 0x4c)?;
//! let raw = bus.raw_read(reg::CURRENT_NOW.address)?;
//! let value = REGMAP.val_endian.parse(raw);
//! ```

pub mod board;
pub mod bus;
pub mod i2cdev;
pub mod register;

// Re-export for convenience
pub use bus::{Direction, RawBus, RawCode};
pub use i2cdev::{SmbusDevice, SmbusError};
pub use register::{Endianness, RegisterDescriptor, RegisterLayout, RegmapConfig, ValueWidth};

// Export current board based on feature flag
#[cfg(feature = "a500")]
pub use board::a500 as current_board;
