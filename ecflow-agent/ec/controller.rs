use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use ecflow_raw::current_board::{self, cmd, reg, CurrentNow};
use ecflow_raw::{RawBus, RegisterDescriptor, RegisterLayout};

use crate::common::clock::Delay;
use crate::common::regmap::RegisterMap;
use crate::common::transport::RetryTransport;
use crate::config::EcConfig;
use crate::error::{EcflowError, MapError, Result};

crate::enum_with_data! {
    /// Commands that start an irreversible power transition
    pub enum PowerCommand: (RegisterDescriptor, u16) {
        Shutdown => ("shutdown", (reg::SHUTDOWN, cmd::SHUTDOWN)),
        WarmReboot => ("warm-reboot", (reg::WARM_REBOOT, cmd::WARM_REBOOT)),
        ColdReboot => ("cold-reboot", (reg::COLD_REBOOT, cmd::COLD_REBOOT)),
    }
    impl target -> (RegisterDescriptor, u16)
}

crate::enum_with_data! {
    /// LED states the controller firmware can show
    pub enum LedCommand: RegisterDescriptor {
        Off => ("off", reg::RESET_LEDS),
        Power => ("power", reg::POWER_LED_ON),
        Charge => ("charge", reg::CHARGE_LED_ON),
    }
    impl register -> RegisterDescriptor
}

/// One embedded controller reachable through one transport session
///
/// The register map is serialized by a mutex, so sub-devices and power
/// handlers on different threads never interleave bus exchanges.
pub struct Controller {
    name: &'static str,
    map: Mutex<RegisterMap>,
    known: &'static [RegisterDescriptor],
    delay: Arc<dyn Delay>,
    power_cmd_timeout: Duration,
}

impl Controller {
    /// Bind a register map, rejecting it if any known register falls outside it
    pub fn new(
        name: &'static str,
        map: RegisterMap,
        known: &'static [RegisterDescriptor],
        power_cmd_timeout: Duration,
    ) -> std::result::Result<Self, MapError> {
        map.validate(known)?;
        let delay = map.transport().delay();

        Ok(Self {
            name,
            map: Mutex::new(map),
            known,
            delay,
            power_cmd_timeout,
        })
    }

    /// Controller of the current board on `bus`
    pub fn a500(
        bus: Box<dyn RawBus + Send>,
        config: &EcConfig,
        delay: Arc<dyn Delay>,
    ) -> std::result::Result<Self, MapError> {
        let transport = RetryTransport::new(bus, config.retry, delay)
            .with_read_settle(reg::CURRENT_NOW.address, config.current_settle());
        let map = RegisterMap::new(current_board::REGMAP, transport)?;

        Self::new(
            current_board::REGMAP.name,
            map,
            current_board::KNOWN_REGISTERS,
            config.power_cmd_timeout(),
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn known_registers(&self) -> &'static [RegisterDescriptor] {
        self.known
    }

    pub fn read_current(&self) -> std::result::Result<CurrentNow, MapError> {
        let raw = self.map.lock().read(&reg::CURRENT_NOW)?;
        Ok(CurrentNow::from_reg_value(raw))
    }

    pub fn read_status(&self) -> std::result::Result<u16, MapError> {
        self.map.lock().read(&reg::STATUS)
    }

    pub fn read_voltage(&self) -> std::result::Result<u16, MapError> {
        self.map.lock().read(&reg::VOLTAGE)
    }

    pub fn read_capacity(&self) -> std::result::Result<u16, MapError> {
        self.map.lock().read(&reg::CAPACITY)
    }

    /// Send the shutdown command; returns once the write completes, not
    /// once the machine is off
    pub fn write_shutdown(&self) -> std::result::Result<(), MapError> {
        self.write_command(PowerCommand::Shutdown)
    }

    pub fn write_warm_reboot(&self) -> std::result::Result<(), MapError> {
        self.write_command(PowerCommand::WarmReboot)
    }

    pub fn write_cold_reboot(&self) -> std::result::Result<(), MapError> {
        self.write_command(PowerCommand::ColdReboot)
    }

    pub fn write_led(&self, led: LedCommand) -> std::result::Result<(), MapError> {
        self.map.lock().write(&led.register(), cmd::LED)
    }

    /// Send a power command with one bus attempt and no retry
    pub fn issue(&self, command: PowerCommand) -> std::result::Result<(), MapError> {
        let (desc, opcode) = command.target();
        self.map.lock().write_once(&desc, opcode)
    }

    /// Block until a power command has had time to latch in hardware
    pub fn settle_after_command(&self) {
        self.delay.sleep(self.power_cmd_timeout);
    }

    /// Read a register of the known set by name
    pub fn read_register(&self, name: &str) -> Result<u16> {
        let desc = self
            .known
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| EcflowError::UnknownRegister(name.to_string()))?;

        Ok(self.map.lock().read(desc)?)
    }

    fn write_command(&self, command: PowerCommand) -> std::result::Result<(), MapError> {
        let (desc, opcode) = command.target();
        tracing::info!("{}: sending {} command", self.name, command.name());
        self.map.lock().write(&desc, opcode)
    }
}
