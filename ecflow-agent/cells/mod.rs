//! Logical sub-devices sharing one controller
//!
//! The set of sub-device kinds is closed: a power-sense readout and an LED
//! indicator. Each reaches the hardware only through the controller it was
//! probed with, and holds it weakly so removal of the controller is never
//! delayed by a sub-device.

pub mod indicator;
pub mod power_sense;
pub mod registry;

use std::sync::{Arc, Weak};

use crate::ec::{Controller, LedCommand};
use crate::error::{EcflowError, Result};

pub use indicator::Indicator;
pub use power_sense::{PowerReading, PowerSense};
pub use registry::{CellInit, CellSpec, SubDeviceRegistry, A500_CELLS, A500_READOUT_CELLS};

crate::named_enum! {
    pub enum SubDeviceKind {
        PowerSense => "power-sense",
        Indicator => "indicator",
    }
}

/// Capability of sub-devices that report measurements
pub trait Readout {
    fn read(&self) -> Result<PowerReading>;
}

/// Capability of sub-devices that drive a visible indicator
pub trait Indicate {
    fn set(&self, led: LedCommand) -> Result<()>;
    fn state(&self) -> LedCommand;
}

#[derive(Debug)]
pub enum SubDevice {
    PowerSense(PowerSense),
    Indicator(Indicator),
}

pub type SubDeviceHandle = Arc<SubDevice>;

impl SubDevice {
    /// Bring up the sub-device described by `spec`
    pub fn probe(spec: &CellSpec, controller: &Arc<Controller>) -> Result<Self> {
        match spec.kind {
            SubDeviceKind::PowerSense => {
                PowerSense::probe(spec.name, controller).map(SubDevice::PowerSense)
            }
            SubDeviceKind::Indicator => {
                let initial = match spec.init {
                    Some(CellInit::Led(led)) => led,
                    None => LedCommand::Off,
                };
                Indicator::probe(spec.name, controller, initial).map(SubDevice::Indicator)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubDevice::PowerSense(dev) => dev.name(),
            SubDevice::Indicator(dev) => dev.name(),
        }
    }

    pub fn kind(&self) -> SubDeviceKind {
        match self {
            SubDevice::PowerSense(_) => SubDeviceKind::PowerSense,
            SubDevice::Indicator(_) => SubDeviceKind::Indicator,
        }
    }

    pub fn as_readout(&self) -> Option<&dyn Readout> {
        match self {
            SubDevice::PowerSense(dev) => Some(dev as &dyn Readout),
            SubDevice::Indicator(_) => None,
        }
    }

    pub fn as_indicator(&self) -> Option<&dyn Indicate> {
        match self {
            SubDevice::Indicator(dev) => Some(dev as &dyn Indicate),
            SubDevice::PowerSense(_) => None,
        }
    }
}

/// Upgrade a sub-device's controller reference, failing once it is removed
pub(crate) fn upgrade(controller: &Weak<Controller>, name: &'static str) -> Result<Arc<Controller>> {
    controller.upgrade().ok_or(EcflowError::ControllerGone(name))
}
