use ecflow_raw::{Direction, RegisterDescriptor, RegmapConfig, ValueWidth};

use crate::common::transport::RetryTransport;
use crate::error::MapError;

/// Register map bound to one transport session
///
/// Stateless with respect to the hardware: there is no cache, and a read
/// only reflects a prior write if the hardware still holds that value.
pub struct RegisterMap {
    config: RegmapConfig,
    transport: RetryTransport,
}

impl RegisterMap {
    pub fn new(config: RegmapConfig, transport: RetryTransport) -> Result<Self, MapError> {
        config.validate().map_err(MapError::InvalidConfig)?;
        Ok(Self { config, transport })
    }

    pub fn config(&self) -> &RegmapConfig {
        &self.config
    }

    pub fn transport(&self) -> &RetryTransport {
        &self.transport
    }

    /// Check a register set against the map before any access
    ///
    /// Every register must fit the map, and no two may share an address.
    pub fn validate(&self, registers: &[RegisterDescriptor]) -> Result<(), MapError> {
        for (i, desc) in registers.iter().enumerate() {
            self.check(desc)?;
            if let Some(first) = registers[..i].iter().find(|d| d.address == desc.address) {
                return Err(MapError::DuplicateAddress {
                    address: desc.address,
                    first: first.name,
                    second: desc.name,
                });
            }
        }
        Ok(())
    }

    pub fn read(&mut self, desc: &RegisterDescriptor) -> Result<u16, MapError> {
        self.check(desc)?;

        let mut raw = 0;
        self.transport
            .exchange(Direction::Read, desc.address, &mut raw)
            .map_err(|source| MapError::Transport {
                register: desc.name,
                source,
            })?;

        Ok(self.parse(desc, raw))
    }

    pub fn write(&mut self, desc: &RegisterDescriptor, value: u16) -> Result<(), MapError> {
        self.check(desc)?;

        let mut raw = self.format(desc, value);
        self.transport
            .exchange(Direction::Write, desc.address, &mut raw)
            .map_err(|source| MapError::Transport {
                register: desc.name,
                source,
            })
    }

    /// Write with a single bus attempt, for paths that cannot afford retries
    pub fn write_once(&mut self, desc: &RegisterDescriptor, value: u16) -> Result<(), MapError> {
        self.check(desc)?;

        let mut raw = self.format(desc, value);
        self.transport
            .exchange_once(Direction::Write, desc.address, &mut raw)
            .map_err(|source| MapError::Transport {
                register: desc.name,
                source,
            })
    }

    fn check(&self, desc: &RegisterDescriptor) -> Result<(), MapError> {
        if desc.address > self.config.max_register {
            return Err(MapError::OutOfRange {
                address: desc.address,
                max: self.config.max_register,
            });
        }
        if desc.width.bits() > self.config.val_bits {
            return Err(MapError::WidthMismatch {
                register: desc.name,
                width: desc.width.bits(),
                map_bits: self.config.val_bits,
            });
        }
        Ok(())
    }

    fn format(&self, desc: &RegisterDescriptor, value: u16) -> u16 {
        match desc.width {
            ValueWidth::Bits8 => value & ValueWidth::Bits8.mask(),
            ValueWidth::Bits16 => self.config.val_endian.format(value),
        }
    }

    fn parse(&self, desc: &RegisterDescriptor, raw: u16) -> u16 {
        match desc.width {
            ValueWidth::Bits8 => raw & ValueWidth::Bits8.mask(),
            ValueWidth::Bits16 => self.config.val_endian.parse(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::testing::{MockBus, RecordingDelay, EIO};
    use ecflow_raw::Endianness;
    use std::sync::Arc;

    const SMALL: RegmapConfig = RegmapConfig {
        name: "test",
        reg_bits: 8,
        val_bits: 16,
        max_register: 0x3f,
        val_endian: Endianness::Little,
    };

    fn map(config: RegmapConfig, bus: &MockBus) -> RegisterMap {
        let transport = RetryTransport::new(
            Box::new(bus.clone()),
            RetryPolicy::default(),
            Arc::new(RecordingDelay::new()),
        );
        RegisterMap::new(config, transport).unwrap()
    }

    #[test]
    fn test_in_range_access_hits_bus_once() {
        let bus = MockBus::new().with_register(0x10, 0x00AA);
        let mut m = map(SMALL, &bus);
        let reg = RegisterDescriptor::word("reg", 0x10);

        assert_eq!(m.read(&reg).unwrap(), 0x00AA);
        m.write(&reg, 0x0055).unwrap();
        assert_eq!(bus.calls(), 2);
    }

    #[test]
    fn test_out_of_range_never_touches_bus() {
        let bus = MockBus::new();
        let mut m = map(SMALL, &bus);
        let reg = RegisterDescriptor::word("far", 0x40);

        assert_eq!(
            m.read(&reg),
            Err(MapError::OutOfRange {
                address: 0x40,
                max: 0x3f
            })
        );
        assert!(matches!(
            m.write(&reg, 1),
            Err(MapError::OutOfRange { .. })
        ));
        assert!(matches!(
            m.write_once(&reg, 1),
            Err(MapError::OutOfRange { .. })
        ));
        assert_eq!(bus.calls(), 0);
    }

    #[test]
    fn test_validate_register_set() {
        let bus = MockBus::new();
        let m = map(SMALL, &bus);
        let ok = [RegisterDescriptor::word("a", 0x00), RegisterDescriptor::word("b", 0x3f)];
        let bad = [RegisterDescriptor::word("a", 0x00), RegisterDescriptor::word("c", 0x52)];

        assert!(m.validate(&ok).is_ok());
        assert!(matches!(
            m.validate(&bad),
            Err(MapError::OutOfRange { address: 0x52, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_shared_address() {
        let bus = MockBus::new();
        let m = map(SMALL, &bus);
        let regs = [
            RegisterDescriptor::word("shutdown", 0x32),
            RegisterDescriptor::word("status", 0x02),
            RegisterDescriptor::word("warm", 0x32),
        ];

        assert_eq!(
            m.validate(&regs),
            Err(MapError::DuplicateAddress {
                address: 0x32,
                first: "shutdown",
                second: "warm",
            })
        );
        assert_eq!(bus.calls(), 0);
    }

    #[test]
    fn test_big_endian_values_are_swapped_on_bus() {
        let bus = MockBus::new();
        let config = RegmapConfig {
            val_endian: Endianness::Big,
            ..SMALL
        };
        let mut m = map(config, &bus);
        let reg = RegisterDescriptor::word("be", 0x01);

        m.write(&reg, 0x1234).unwrap();
        assert_eq!(bus.value(0x01), Some(0x1234u16.to_be()));
        assert_eq!(m.read(&reg).unwrap(), 0x1234);
    }

    #[test]
    fn test_byte_registers_are_masked() {
        let bus = MockBus::new().with_register(0x05, 0xABCD);
        let mut m = map(SMALL, &bus);
        let reg = RegisterDescriptor::byte("b", 0x05);

        assert_eq!(m.read(&reg).unwrap(), 0xCD);
        m.write(&reg, 0x1FF).unwrap();
        assert_eq!(bus.value(0x05), Some(0xFF));
    }

    #[test]
    fn test_wide_register_on_narrow_map() {
        let bus = MockBus::new();
        let config = RegmapConfig {
            val_bits: 8,
            ..SMALL
        };
        let mut m = map(config, &bus);

        assert!(matches!(
            m.read(&RegisterDescriptor::word("w", 0x01)),
            Err(MapError::WidthMismatch { .. })
        ));
        assert_eq!(bus.calls(), 0);
    }

    #[test]
    fn test_transport_error_tagged_with_register() {
        let bus = MockBus::new();
        bus.fail_always(0x02, EIO);
        let mut m = map(SMALL, &bus);

        let err = m.read(&RegisterDescriptor::word("status", 0x02)).unwrap_err();
        match err {
            MapError::Transport { register, source } => {
                assert_eq!(register, "status");
                assert_eq!(source.address, 0x02);
                assert_eq!(source.raw_code, EIO);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bus = MockBus::new();
        let transport = RetryTransport::new(
            Box::new(bus),
            RetryPolicy::default(),
            Arc::new(RecordingDelay::new()),
        );
        let config = RegmapConfig {
            val_bits: 32,
            ..SMALL
        };
        assert!(matches!(
            RegisterMap::new(config, transport),
            Err(MapError::InvalidConfig(_))
        ));
    }
}
