pub mod controller;
pub mod device;

pub use controller::{Controller, LedCommand, PowerCommand};
pub use device::EcDevice;
