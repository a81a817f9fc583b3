//! SMBus word access through the Linux i2c-dev interface
//!
//! The kernel performs the wire framing; this module only issues the
//! `I2C_SLAVE` and `I2C_SMBUS` ioctls on `/dev/i2c-*`.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::bus::{RawBus, RawCode};

const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_SMBUS: libc::c_ulong = 0x0720;

const I2C_SMBUS_READ: u8 = 1;
const I2C_SMBUS_WRITE: u8 = 0;
const I2C_SMBUS_WORD_DATA: u32 = 3;

/// Mirror of `union i2c_smbus_data` (block of 32 bytes plus length and PEC)
#[repr(C, align(2))]
struct SmbusData {
    block: [u8; 34],
}

/// Mirror of `struct i2c_smbus_ioctl_data`
#[repr(C)]
struct SmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut SmbusData,
}

/// Errors that can occur while opening an SMBus device
#[derive(Debug, thiserror::Error)]
pub enum SmbusError {
    #[error("Failed to open I2C adapter {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to select client 0x{address:02X} on {path}: {source}")]
    AddressFailed {
        path: PathBuf,
        address: u16,
        source: std::io::Error,
    },
}

/// One client on an I2C adapter, addressed with SMBus word transfers
pub struct SmbusDevice {
    file: File,
    path: PathBuf,
    address: u16,
}

impl SmbusDevice {
    /// Open `path` (e.g. `/dev/i2c-0`) and bind it to the 7-bit `address`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The adapter device cannot be opened (requires root or the i2c group)
    /// - The client address cannot be selected
    pub fn open(path: impl AsRef<Path>, address: u16) -> Result<Self, SmbusError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| SmbusError::OpenFailed {
                path: path.clone(),
                source: e,
            })?;

        // SAFETY: the descriptor is open for the lifetime of `file`.
        let ret = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(address),
            )
        };
        if ret < 0 {
            return Err(SmbusError::AddressFailed {
                path,
                address,
                source: std::io::Error::last_os_error(),
            });
        }

        Ok(Self {
            file,
            path,
            address,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    fn smbus_access(&self, read_write: u8, command: u8, data: &mut SmbusData) -> Result<(), RawCode> {
        let mut args = SmbusIoctlData {
            read_write,
            command,
            size: I2C_SMBUS_WORD_DATA,
            data: data as *mut SmbusData,
        };

        // SAFETY: `args` and `data` outlive the call and match the kernel layout.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_SMBUS as _,
                &mut args as *mut SmbusIoctlData,
            )
        };
        if ret < 0 {
            let errno = std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::EIO);
            return Err(-errno);
        }
        Ok(())
    }
}

impl RawBus for SmbusDevice {
    fn raw_read(&mut self, addr: u8) -> Result<u16, RawCode> {
        let mut data = SmbusData { block: [0; 34] };
        self.smbus_access(I2C_SMBUS_READ, addr, &mut data)?;
        Ok(u16::from_ne_bytes([data.block[0], data.block[1]]))
    }

    fn raw_write(&mut self, addr: u8, value: u16) -> Result<(), RawCode> {
        let mut data = SmbusData { block: [0; 34] };
        data.block[..2].copy_from_slice(&value.to_ne_bytes());
        self.smbus_access(I2C_SMBUS_WRITE, addr, &mut data)
    }
}
