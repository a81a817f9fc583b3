/// Size of the fixed vendor buffer, terminator included
pub const VENDOR_CAPACITY: usize = 40;

crate::named_enum! {
    /// Device class derived from the firmware vendor string
    ///
    /// `Unknown` sorts after every real class, so `class < Unknown` is the
    /// supported-device test.
    #[repr(u8)]
    #[derive(PartialOrd, Ord)]
    pub enum DeviceClassification {
        SurfaceRt => "surface-rt",
        Surface2 => "surface-2",
        Unknown => "unknown",
    }
}

impl DeviceClassification {
    pub fn is_supported(&self) -> bool {
        *self < DeviceClassification::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareIdentity {
    pub vendor: &'static str,
    pub class: DeviceClassification,
}

/// Known firmware vendors, scanned top to bottom
pub const IDENTITIES: &[FirmwareIdentity] = &[
    FirmwareIdentity {
        vendor: "OemkS EFI Jan 24 2014 18:00:42",
        class: DeviceClassification::SurfaceRt,
    },
    FirmwareIdentity {
        vendor: "Covington EFI Aug 26 2013 19:20:25",
        class: DeviceClassification::Surface2,
    },
    FirmwareIdentity {
        vendor: "Surface 2 EFI Sep 11 2014 00:32:29",
        class: DeviceClassification::Surface2,
    },
    FirmwareIdentity {
        vendor: "ASUS UEFI Jul 24 2013 18:23:22",
        class: DeviceClassification::Unknown,
    },
];

/// Classify a vendor string; anything past an embedded NUL is ignored
pub fn classify(vendor: &str) -> DeviceClassification {
    let bytes = vendor.as_bytes();
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    lookup(&bytes[..len])
}

/// Classify a UCS-2 vendor string as firmware reports it
///
/// Each unit is narrowed to its low byte before comparison. This is lossy:
/// units outside Latin-1 collapse onto unrelated bytes, and a unit whose low
/// byte is zero ends the string. Known vendor strings are plain ASCII, and
/// the narrowing is kept so matching behaves exactly as it always has. Units
/// after the first NUL are never read, and input that does not fit the
/// vendor buffer is `Unknown`.
pub fn classify_ucs2(vendor: &[u16]) -> DeviceClassification {
    match narrow(vendor) {
        Some((buf, len)) => lookup(&buf[..len]),
        None => DeviceClassification::Unknown,
    }
}

/// Classify and log the outcome the way the boot path reports it
pub fn identify(vendor: &[u16]) -> DeviceClassification {
    let Some((buf, len)) = narrow(vendor) else {
        tracing::info!("No supported device detected: vendor string too long");
        return DeviceClassification::Unknown;
    };

    let name = String::from_utf8_lossy(&buf[..len]);
    let class = lookup(&buf[..len]);
    if class.is_supported() {
        tracing::info!("Supported device detected: {} ({})", name, class);
    } else {
        tracing::info!("No supported device detected: {}", name);
    }
    class
}

/// Narrow `vendor` into the fixed buffer
///
/// Returns the buffer and the length up to the first narrowed NUL, or `None`
/// when the units before the terminator do not fit.
fn narrow(vendor: &[u16]) -> Option<([u8; VENDOR_CAPACITY], usize)> {
    let mut buf = [0u8; VENDOR_CAPACITY];
    let mut len = 0;

    for &unit in vendor {
        if unit == 0 {
            break;
        }
        if len == VENDOR_CAPACITY - 1 {
            return None;
        }
        buf[len] = unit as u8;
        len += 1;
    }

    let end = buf[..len].iter().position(|&b| b == 0).unwrap_or(len);
    Some((buf, end))
}

fn lookup(vendor: &[u8]) -> DeviceClassification {
    if vendor.len() >= VENDOR_CAPACITY {
        return DeviceClassification::Unknown;
    }

    IDENTITIES
        .iter()
        .find(|id| id.vendor.as_bytes() == vendor)
        .map(|id| id.class)
        .unwrap_or(DeviceClassification::Unknown)
}
