//! Firmware identity lookup
//!
//! Maps the firmware vendor string reported at boot to a device class. The
//! lookup is independent of the controller and usable on its own.

pub mod identity;

pub use identity::{
    classify, classify_ucs2, identify, DeviceClassification, FirmwareIdentity, IDENTITIES,
    VENDOR_CAPACITY,
};
