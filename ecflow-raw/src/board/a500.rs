//! Acer Iconia Tab A500 embedded controller (ENE KB930) definitions
//!
//! The controller sits on an I2C bus and answers SMBus word transfers. Its
//! firmware expects specific command opcodes for the power registers and
//! silently skips unsupported ones.

use crate::register::{Endianness, RegisterDescriptor, RegmapConfig, RegisterLayout};

/// Firmware-tree compatible string of the controller
pub const COMPATIBLE: &str = "acer,a500-iconia-ec";

/// Default 7-bit I2C client address
pub const I2C_ADDRESS: u16 = 0x4c;

/// Register map configuration of the KB930
pub const REGMAP: RegmapConfig = RegmapConfig {
    name: "KB930",
    reg_bits: 8,
    val_bits: 16,
    max_register: 0xff,
    val_endian: Endianness::Little,
};

/// Timing of the controller
pub mod timing {
    use std::time::Duration;

    /// Attempts per register exchange before giving up
    pub const RETRY_ATTEMPTS: u32 = 5;

    /// Wait after each failed exchange
    pub const I2C_ERR_TIMEOUT: Duration = Duration::from_millis(500);

    /// Recovery time after reading the current-sense register
    pub const CURRENT_SETTLE: Duration = Duration::from_micros(10_000);

    /// Time for a power command to latch before execution may continue
    pub const POWER_CMD_TIMEOUT: Duration = Duration::from_millis(1000);
}

/// Register descriptors
pub mod reg {
    use crate::register::RegisterDescriptor;

    /// Battery capacity in percent
    pub const CAPACITY: RegisterDescriptor = RegisterDescriptor::word("capacity", 0x00);

    /// Battery voltage in millivolts
    pub const VOLTAGE: RegisterDescriptor = RegisterDescriptor::word("voltage_now", 0x01);

    /// Controller status word
    pub const STATUS: RegisterDescriptor = RegisterDescriptor::word("status", 0x02);

    /// Battery current in milliamps, signed. Reading disturbs the sense
    /// front-end, see [`super::timing::CURRENT_SETTLE`].
    pub const CURRENT_NOW: RegisterDescriptor = RegisterDescriptor::word("current_now", 0x03);

    /// Turns every LED off
    pub const RESET_LEDS: RegisterDescriptor = RegisterDescriptor::word("reset_leds", 0x40);

    /// Turns the white power LED on
    pub const POWER_LED_ON: RegisterDescriptor = RegisterDescriptor::word("power_led_on", 0x42);

    /// Turns the amber charge LED on
    pub const CHARGE_LED_ON: RegisterDescriptor = RegisterDescriptor::word("charge_led_on", 0x43);

    /// Power the machine off
    pub const SHUTDOWN: RegisterDescriptor = RegisterDescriptor::word("shutdown", 0x52);

    /// Reboot keeping the controller state
    pub const WARM_REBOOT: RegisterDescriptor = RegisterDescriptor::word("warm_reboot", 0x54);

    /// Reboot through a full power cycle
    pub const COLD_REBOOT: RegisterDescriptor = RegisterDescriptor::word("cold_reboot", 0x55);
}

/// Command opcodes expected by the firmware
pub mod cmd {
    pub const SHUTDOWN: u16 = 0x0;
    pub const WARM_REBOOT: u16 = 0x0;
    pub const COLD_REBOOT: u16 = 0x1;
    pub const LED: u16 = 0x0;
}

/// Every register the controller driver is allowed to touch
pub const KNOWN_REGISTERS: &[RegisterDescriptor] = &[
    reg::CAPACITY,
    reg::VOLTAGE,
    reg::STATUS,
    reg::CURRENT_NOW,
    reg::RESET_LEDS,
    reg::POWER_LED_ON,
    reg::CHARGE_LED_ON,
    reg::SHUTDOWN,
    reg::WARM_REBOOT,
    reg::COLD_REBOOT,
];

/// Logical sub-devices sharing the controller
pub mod cells {
    pub const BATTERY: &str = "acer-a500-iconia-battery";
    pub const LEDS: &str = "acer-a500-iconia-leds";
}

/// Battery current register layout
///
/// ## Register Format
///
/// | Bits  | Field      | Description                              |
/// |-------|------------|------------------------------------------|
/// | 0-15  | milliamps  | Two's complement, negative = discharging |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurrentNow {
    pub milliamps: i16,
}

impl RegisterLayout for CurrentNow {
    fn to_reg_value(&self) -> u16 {
        self.milliamps as u16
    }

    fn from_reg_value(value: u16) -> Self {
        Self {
            milliamps: value as i16,
        }
    }
}

impl CurrentNow {
    pub fn microamps(&self) -> i32 {
        i32::from(self.milliamps) * 1000
    }

    pub fn is_discharging(&self) -> bool {
        self.milliamps < 0
    }
}
