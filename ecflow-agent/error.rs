use std::io;
use thiserror::Error;

use ecflow_raw::{Direction, RawCode};

use crate::power::{ChainKind, Priority};

/// Bus-level failure surfaced after the retry budget is exhausted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{direction} 0x{address:02x} failed after {attempts} attempts: {raw_code}")]
pub struct TransportError {
    pub direction: Direction,
    pub address: u8,
    /// Raw code of the last failed attempt
    pub raw_code: RawCode,
    pub attempts: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("Register 0x{address:02x} is beyond the map maximum 0x{max:02x}")]
    OutOfRange { address: u8, max: u8 },

    #[error("Register {register} is {width} bits wide but the map carries {map_bits}-bit values")]
    WidthMismatch {
        register: &'static str,
        width: u8,
        map_bits: u8,
    },

    #[error("Registers {first} and {second} share address 0x{address:02x}")]
    DuplicateAddress {
        address: u8,
        first: &'static str,
        second: &'static str,
    },

    #[error("Invalid map configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("Register {register}: {source}")]
    Transport {
        register: &'static str,
        #[source]
        source: TransportError,
    },
}

impl MapError {
    /// The underlying transport failure, if this error came from the bus
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            MapError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Priority {priority} is already taken in the {kind} chain")]
    DuplicateOrInvalidPriority { kind: ChainKind, priority: Priority },

    #[error("Handler {id} is not registered")]
    NotRegistered { id: u64 },
}

/// Sub-device bring-up failure; partially registered cells are always removed
#[derive(Error, Debug)]
#[error("Failed to add sub-device #{index} ({name}): {cause}")]
pub struct InstantiationError {
    pub index: usize,
    pub name: &'static str,
    #[source]
    pub cause: Box<EcflowError>,
    pub rolled_back: bool,
}

#[derive(Error, Debug)]
pub enum EcflowError {
    #[error("Register access failed: {0}")]
    Map(#[from] MapError),

    #[error("Handler registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Instantiation(#[from] InstantiationError),

    #[error("Controller for {0} has been removed")]
    ControllerGone(&'static str),

    #[error("Register {0} is not known to this controller")]
    UnknownRegister(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("SMBus error: {0}")]
    SmbusError(#[from] ecflow_raw::SmbusError),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Nix error: {0}")]
    NixError(#[from] nix::Error),

    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, EcflowError>;
