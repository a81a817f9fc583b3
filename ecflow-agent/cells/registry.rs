use parking_lot::Mutex;
use std::sync::Arc;

use ecflow_raw::current_board::cells;

use crate::cells::{SubDevice, SubDeviceHandle, SubDeviceKind};
use crate::ec::{Controller, LedCommand};
use crate::error::InstantiationError;

/// Optional data handed to a sub-device at probe time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellInit {
    Led(LedCommand),
}

/// Declared sub-device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpec {
    pub name: &'static str,
    pub kind: SubDeviceKind,
    pub init: Option<CellInit>,
}

const A500_BATTERY: CellSpec = CellSpec {
    name: cells::BATTERY,
    kind: SubDeviceKind::PowerSense,
    init: None,
};

/// Sub-devices of the A500 controller
pub const A500_CELLS: &[CellSpec] = &[
    A500_BATTERY,
    CellSpec {
        name: cells::LEDS,
        kind: SubDeviceKind::Indicator,
        init: Some(CellInit::Led(LedCommand::Off)),
    },
];

/// A500 sub-devices that never write to the controller when probed
pub const A500_READOUT_CELLS: &[CellSpec] = &[A500_BATTERY];

/// Fixed list of sub-devices and the ones currently registered
pub struct SubDeviceRegistry {
    cells: Vec<CellSpec>,
    live: Mutex<Vec<SubDeviceHandle>>,
}

impl SubDeviceRegistry {
    pub fn new(cells: &[CellSpec]) -> Self {
        Self {
            cells: cells.to_vec(),
            live: Mutex::new(Vec::new()),
        }
    }

    pub fn a500() -> Self {
        Self::new(A500_CELLS)
    }

    pub fn a500_readouts() -> Self {
        Self::new(A500_READOUT_CELLS)
    }

    pub fn cells(&self) -> &[CellSpec] {
        &self.cells
    }

    /// Probe and register every declared sub-device in order
    ///
    /// All or nothing: on the first failure, every sub-device registered by
    /// this call is removed again, newest first, and the error names the
    /// failing entry.
    pub fn instantiate(
        &self,
        controller: &Arc<Controller>,
    ) -> Result<Vec<SubDeviceHandle>, InstantiationError> {
        let mut added: Vec<SubDeviceHandle> = Vec::with_capacity(self.cells.len());

        for (index, spec) in self.cells.iter().enumerate() {
            match SubDevice::probe(spec, controller) {
                Ok(device) => {
                    let handle = Arc::new(device);
                    self.live.lock().push(Arc::clone(&handle));
                    tracing::info!("{}: added sub-device {}", controller.name(), spec.name);
                    added.push(handle);
                }
                Err(cause) => {
                    tracing::error!(
                        "{}: failed to add sub-device {}: {}",
                        controller.name(),
                        spec.name,
                        cause
                    );
                    self.unregister(&added);
                    return Err(InstantiationError {
                        index,
                        name: spec.name,
                        cause: Box::new(cause),
                        rolled_back: true,
                    });
                }
            }
        }

        Ok(added)
    }

    /// Unregister every live sub-device, newest first
    pub fn remove_all(&self) {
        let mut live = self.live.lock();
        while let Some(device) = live.pop() {
            tracing::debug!("Removed sub-device {}", device.name());
        }
    }

    pub fn registered(&self) -> Vec<&'static str> {
        self.live.lock().iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, name: &str) -> Option<SubDeviceHandle> {
        self.live.lock().iter().find(|d| d.name() == name).cloned()
    }

    fn unregister(&self, devices: &[SubDeviceHandle]) {
        let mut live = self.live.lock();
        for device in devices.iter().rev() {
            live.retain(|d| !Arc::ptr_eq(d, device));
            tracing::debug!("Rolled back sub-device {}", device.name());
        }
    }
}
