//! Register descriptors, map configuration and typed register layouts

/// Width of a register value on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueWidth {
    Bits8,
    Bits16,
}

impl ValueWidth {
    pub const fn bits(self) -> u8 {
        match self {
            ValueWidth::Bits8 => 8,
            ValueWidth::Bits16 => 16,
        }
    }

    /// Mask covering every bit a value of this width may carry
    pub const fn mask(self) -> u16 {
        match self {
            ValueWidth::Bits8 => 0x00FF,
            ValueWidth::Bits16 => 0xFFFF,
        }
    }
}

/// Byte order applied to multi-byte register values before they reach the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Native,
    Little,
    Big,
}

impl Endianness {
    /// Format a host value for the bus
    pub fn format(self, value: u16) -> u16 {
        match self {
            Endianness::Native => value,
            Endianness::Little => value.to_le(),
            Endianness::Big => value.to_be(),
        }
    }

    /// Parse a bus value back into host order
    pub fn parse(self, raw: u16) -> u16 {
        match self {
            Endianness::Native => raw,
            Endianness::Little => u16::from_le(raw),
            Endianness::Big => u16::from_be(raw),
        }
    }
}

/// Fixed identity of one named hardware value
///
/// Descriptors are declared as constants per board and never change at
/// runtime.
///
/// # Example
///
/// ```
/// use ecflow_raw::register::{RegisterDescriptor, ValueWidth};
///
/// const REG_CURRENT_NOW: RegisterDescriptor =
///     RegisterDescriptor::new("current_now", 0x03, ValueWidth::Bits16);
///
/// assert_eq!(REG_CURRENT_NOW.address, 0x03);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterDescriptor {
    /// Name used in logs and errors
    pub name: &'static str,
    /// Register address on the bus
    pub address: u8,
    /// Width of the value held by the register
    pub width: ValueWidth,
}

impl RegisterDescriptor {
    pub const fn new(name: &'static str, address: u8, width: ValueWidth) -> Self {
        Self {
            name,
            address,
            width,
        }
    }

    pub const fn word(name: &'static str, address: u8) -> Self {
        Self::new(name, address, ValueWidth::Bits16)
    }

    pub const fn byte(name: &'static str, address: u8) -> Self {
        Self::new(name, address, ValueWidth::Bits8)
    }
}

/// Static configuration of a register map
///
/// Holds no runtime state: there is no cache, so every access through a map
/// built from this configuration is a live round trip to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegmapConfig {
    /// Map name, used in logs
    pub name: &'static str,
    /// Width of a register address in bits
    pub reg_bits: u8,
    /// Width of a register value in bits
    pub val_bits: u8,
    /// Highest valid register address
    pub max_register: u8,
    /// Byte order of register values
    pub val_endian: Endianness,
}

impl RegmapConfig {
    /// Check that the configuration itself is consistent
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.reg_bits == 0 || self.reg_bits > 8 {
            return Err("Register address width must be 1..=8 bits");
        }
        if self.val_bits != 8 && self.val_bits != 16 {
            return Err("Register value width must be 8 or 16 bits");
        }
        if self.reg_bits < 8 && u16::from(self.max_register) >= (1u16 << self.reg_bits) {
            return Err("Maximum register does not fit the address width");
        }
        Ok(())
    }
}

/// Trait for register layouts that can be converted to/from raw register values
///
/// # Example
///
/// ```ignore
/// use ecflow_raw::register::RegisterLayout;
///
/// #[derive(Debug, Default)]
/// struct LedControl {
///     on: bool,
/// }
///
/// impl RegisterLayout for LedControl {
///     fn to_reg_value(&self) -> u16 {
///         self.on as u16
///     }
///
///     fn from_reg_value(value: u16) -> Self {
///         Self { on: value & 1 != 0 }
///     }
/// }
/// ```
pub trait RegisterLayout: Sized {
    /// Convert this register layout to a raw register value
    fn to_reg_value(&self) -> u16;

    /// Parse a raw register value into this register layout
    fn from_reg_value(value: u16) -> Self;

    /// Validate that the register values are within acceptable ranges
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endianness_big_swaps_on_bus() {
        let formatted = Endianness::Big.format(0x1234);
        assert_eq!(formatted, 0x1234u16.to_be());
        assert_eq!(Endianness::Big.parse(formatted), 0x1234);
    }

    #[test]
    fn test_native_is_identity() {
        assert_eq!(Endianness::Native.format(0xBEEF), 0xBEEF);
        assert_eq!(Endianness::Native.parse(0xBEEF), 0xBEEF);
    }

    #[test]
    fn test_regmap_config_validation() {
        let config = RegmapConfig {
            name: "test",
            reg_bits: 4,
            val_bits: 16,
            max_register: 0x1F,
            val_endian: Endianness::Little,
        };
        assert!(config.validate().is_err());

        let config = RegmapConfig {
            max_register: 0x0F,
            ..config
        };
        assert!(config.validate().is_ok());

        let config = RegmapConfig {
            val_bits: 12,
            ..config
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_width_mask() {
        assert_eq!(ValueWidth::Bits8.mask(), 0xFF);
        assert_eq!(ValueWidth::Bits16.bits(), 16);
        assert!(ValueWidth::Bits8 < ValueWidth::Bits16);
    }
}
