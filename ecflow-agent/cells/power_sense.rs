use std::sync::{Arc, Weak};

use ecflow_raw::current_board::CurrentNow;

use crate::cells::{upgrade, Readout};
use crate::ec::Controller;
use crate::error::Result;

/// One snapshot of the battery front-end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerReading {
    pub current: CurrentNow,
    pub voltage_mv: u16,
    pub capacity_percent: u16,
    pub status: u16,
}

/// Battery readout sharing the controller's transport session
#[derive(Debug)]
pub struct PowerSense {
    name: &'static str,
    controller: Weak<Controller>,
}

impl PowerSense {
    /// Probe by reading the status word, proving the controller answers
    pub fn probe(name: &'static str, controller: &Arc<Controller>) -> Result<Self> {
        let status = controller.read_status()?;
        tracing::debug!("{}: probed, status 0x{:04x}", name, status);

        Ok(Self {
            name,
            controller: Arc::downgrade(controller),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn current_now(&self) -> Result<CurrentNow> {
        let ec = upgrade(&self.controller, self.name)?;
        Ok(ec.read_current()?)
    }
}

impl Readout for PowerSense {
    fn read(&self) -> Result<PowerReading> {
        let ec = upgrade(&self.controller, self.name)?;

        Ok(PowerReading {
            current: ec.read_current()?,
            voltage_mv: ec.read_voltage()?,
            capacity_percent: ec.read_capacity()?,
            status: ec.read_status()?,
        })
    }
}
