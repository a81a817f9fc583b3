use std::sync::Arc;

use ecflow_raw::SmbusDevice;

use crate::cells::{SubDeviceHandle, SubDeviceKind, SubDeviceRegistry};
use crate::common::clock::ThreadDelay;
use crate::config::EcConfig;
use crate::ec::Controller;
use crate::error::Result;
use crate::power::{register_ec_handlers, EcPowerHandlers, PowerChains};

/// A bound controller with its sub-devices and power handlers
///
/// Bring-up is all or nothing. Tear-down runs in reverse: power handlers
/// are revoked first, then sub-devices unregistered, and only then is the
/// controller released.
pub struct EcDevice {
    handlers: Option<EcPowerHandlers>,
    cells: Vec<SubDeviceHandle>,
    registry: SubDeviceRegistry,
    controller: Arc<Controller>,
}

impl EcDevice {
    /// Bring up sub-devices, then power handlers if the controller is
    /// authoritative for system power
    pub fn probe(
        controller: Controller,
        registry: SubDeviceRegistry,
        chains: &Arc<PowerChains>,
        system_power_controller: bool,
    ) -> Result<Self> {
        let controller = Arc::new(controller);
        let cells = registry.instantiate(&controller)?;

        let handlers = if system_power_controller {
            match register_ec_handlers(chains, &controller) {
                Ok(handlers) => Some(handlers),
                Err(e) => {
                    registry.remove_all();
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        tracing::info!(
            "{}: bound with {} sub-devices{}",
            controller.name(),
            cells.len(),
            if handlers.is_some() {
                ", system power controller"
            } else {
                ""
            }
        );

        Ok(Self {
            handlers,
            cells,
            registry,
            controller,
        })
    }

    /// Open the configured SMBus client and bring up the A500 controller on it
    pub fn open(config: &EcConfig, chains: &Arc<PowerChains>) -> Result<Self> {
        let controller = Self::bind(config)?;
        Self::probe(
            controller,
            SubDeviceRegistry::a500(),
            chains,
            config.system_power_controller,
        )
    }

    /// Open the controller for readouts only
    ///
    /// Only sub-devices that read at probe time are brought up, and no power
    /// handler is registered, so nothing is written to the controller.
    pub fn open_readonly(config: &EcConfig) -> Result<Self> {
        let controller = Self::bind(config)?;
        Self::probe(
            controller,
            SubDeviceRegistry::a500_readouts(),
            &Arc::new(PowerChains::new()),
            false,
        )
    }

    fn bind(config: &EcConfig) -> Result<Controller> {
        config.validate()?;
        let bus = SmbusDevice::open(&config.bus, config.address)?;
        tracing::info!(
            "Opened EC at 0x{:02x} on {}",
            bus.address(),
            bus.path().display()
        );

        Ok(Controller::a500(Box::new(bus), config, Arc::new(ThreadDelay))?)
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    pub fn cells(&self) -> &[SubDeviceHandle] {
        &self.cells
    }

    pub fn cell(&self, kind: SubDeviceKind) -> Option<&SubDeviceHandle> {
        self.cells.iter().find(|c| c.kind() == kind)
    }

    pub fn registry(&self) -> &SubDeviceRegistry {
        &self.registry
    }

    pub fn is_system_power_controller(&self) -> bool {
        self.handlers.is_some()
    }

    /// Unbind the controller
    pub fn remove(self) {
        drop(self);
    }
}

impl Drop for EcDevice {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.take() {
            handlers.revoke();
        }
        self.cells.clear();
        self.registry.remove_all();
        tracing::info!("{}: removed", self.controller.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcflowError;
    use crate::power::{ChainKind, ChainPolicy, Priority};
    use crate::testing::{MockBus, RecordingDelay, EIO};

    fn controller(bus: &MockBus, delay: &RecordingDelay) -> Controller {
        Controller::a500(Box::new(bus.clone()), &EcConfig::default(), Arc::new(delay.clone()))
            .unwrap()
    }

    #[test]
    fn test_probe_registers_everything() {
        let bus = MockBus::new();
        let chains = Arc::new(PowerChains::new());

        let dev = EcDevice::probe(
            controller(&bus, &RecordingDelay::new()),
            SubDeviceRegistry::a500(),
            &chains,
            true,
        )
        .unwrap();

        assert_eq!(dev.cells().len(), 2);
        assert!(dev.cell(SubDeviceKind::PowerSense).is_some());
        assert!(dev.is_system_power_controller());
        assert_eq!(chains.len(ChainKind::PowerOff), 1);
        assert_eq!(chains.len(ChainKind::Restart), 1);
    }

    #[test]
    fn test_not_power_controller_registers_no_handlers() {
        let bus = MockBus::new();
        let chains = Arc::new(PowerChains::new());

        let dev = EcDevice::probe(
            controller(&bus, &RecordingDelay::new()),
            SubDeviceRegistry::a500(),
            &chains,
            false,
        )
        .unwrap();

        assert!(!dev.is_system_power_controller());
        assert!(chains.is_empty(ChainKind::PowerOff));
    }

    #[test]
    fn test_sub_device_failure_leaves_nothing_registered() {
        let bus = MockBus::new();
        bus.fail_always(0x40, EIO);
        let chains = Arc::new(PowerChains::new());

        let err = EcDevice::probe(
            controller(&bus, &RecordingDelay::new()),
            SubDeviceRegistry::a500(),
            &chains,
            true,
        )
        .err()
        .unwrap();

        assert!(matches!(err, EcflowError::Instantiation(ref e) if e.index == 1));
        assert!(chains.is_empty(ChainKind::PowerOff));
        assert!(chains.is_empty(ChainKind::Restart));
    }

    #[test]
    fn test_handler_failure_rolls_back_sub_devices() {
        let bus = MockBus::new();
        let chains = Arc::new(PowerChains::with_policy(ChainPolicy::Exclusive));
        chains
            .register(ChainKind::PowerOff, Priority::HIGH, "pmic", |_| {})
            .unwrap();
        let registry = SubDeviceRegistry::a500();

        let err = EcDevice::probe(
            controller(&bus, &RecordingDelay::new()),
            registry,
            &chains,
            true,
        )
        .err()
        .unwrap();

        assert!(matches!(err, EcflowError::Registration(_)));
        assert_eq!(chains.len(ChainKind::PowerOff), 1);
        assert!(chains.is_empty(ChainKind::Restart));
    }

    #[test]
    fn test_remove_revokes_before_release() {
        let bus = MockBus::new();
        let chains = Arc::new(PowerChains::new());
        let dev = EcDevice::probe(
            controller(&bus, &RecordingDelay::new()),
            SubDeviceRegistry::a500(),
            &chains,
            true,
        )
        .unwrap();
        let weak = Arc::downgrade(dev.controller());
        let leds = Arc::clone(dev.cell(SubDeviceKind::Indicator).unwrap());

        dev.remove();

        assert!(chains.is_empty(ChainKind::PowerOff));
        assert!(chains.is_empty(ChainKind::Restart));
        assert!(weak.upgrade().is_none());
        assert!(matches!(
            leds.as_indicator().unwrap().set(crate::ec::LedCommand::Power),
            Err(EcflowError::ControllerGone(_))
        ));
    }

    #[test]
    fn test_readout_only_bring_up_never_writes() {
        let bus = MockBus::new();
        let chains = Arc::new(PowerChains::new());

        let dev = EcDevice::probe(
            controller(&bus, &RecordingDelay::new()),
            SubDeviceRegistry::a500_readouts(),
            &chains,
            false,
        )
        .unwrap();

        assert!(dev.cell(SubDeviceKind::PowerSense).is_some());
        assert!(dev.cell(SubDeviceKind::Indicator).is_none());
        dev.controller().read_current().unwrap();
        dev.remove();
        assert!(bus.writes().is_empty());
        assert!(chains.is_empty(ChainKind::PowerOff));
    }

    #[test]
    fn test_open_missing_bus() {
        let config = EcConfig {
            bus: "/nonexistent/i2c-42".into(),
            ..Default::default()
        };
        let chains = Arc::new(PowerChains::new());
        assert!(matches!(
            EcDevice::open(&config, &chains),
            Err(EcflowError::SmbusError(_))
        ));
        assert!(matches!(
            EcDevice::open_readonly(&config),
            Err(EcflowError::SmbusError(_))
        ));
    }
}
