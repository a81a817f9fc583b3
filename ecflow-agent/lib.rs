// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod cells;
pub mod common;
pub mod config;
pub mod ec;
pub mod error;
pub mod firmware;
pub mod power;
pub mod prom;

#[cfg(test)]
mod testing;

pub use cells::{SubDevice, SubDeviceHandle, SubDeviceKind, SubDeviceRegistry};
pub use config::{EcConfig, RetryPolicy};
pub use ec::{Controller, EcDevice, LedCommand, PowerCommand};
pub use error::{EcflowError, Result};
pub use firmware::{classify, classify_ucs2, DeviceClassification};
pub use power::{ChainKind, PowerChains, Priority, RestartMode};
pub use prom::PowerSenseExporter;
