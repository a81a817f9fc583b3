use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ecflow_raw::current_board::{timing, I2C_ADDRESS};

use crate::error::{EcflowError, Result};

/// Retry budget applied to every register exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per exchange, including the first one
    pub attempts: u32,
    /// Wait after each failed attempt, in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: timing::RETRY_ATTEMPTS,
            delay_ms: timing::I2C_ERR_TIMEOUT.as_millis() as u64,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcConfig {
    /// I2C adapter device node
    pub bus: PathBuf,
    /// 7-bit client address of the controller
    pub address: u16,
    pub retry: RetryPolicy,
    /// Settle after reading the current-sense register, in microseconds
    pub current_settle_us: u64,
    /// Settle after a power command, in milliseconds
    pub power_cmd_timeout_ms: u64,
    /// Whether this controller is authoritative for system power
    pub system_power_controller: bool,
    /// Reject handlers sharing a priority within one chain
    pub exclusive_priorities: bool,
}

impl Default for EcConfig {
    fn default() -> Self {
        Self {
            bus: PathBuf::from("/dev/i2c-0"),
            address: I2C_ADDRESS,
            retry: RetryPolicy::default(),
            current_settle_us: timing::CURRENT_SETTLE.as_micros() as u64,
            power_cmd_timeout_ms: timing::POWER_CMD_TIMEOUT.as_millis() as u64,
            system_power_controller: true,
            exclusive_priorities: false,
        }
    }
}

impl EcConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: EcConfig = serde_json::from_str(&text)?;
        config.validate()?;

        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.attempts == 0 {
            return Err(EcflowError::ConfigError(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.address > 0x7f {
            return Err(EcflowError::ConfigError(format!(
                "I2C address 0x{:x} is not a 7-bit address",
                self.address
            )));
        }
        Ok(())
    }

    pub fn current_settle(&self) -> Duration {
        Duration::from_micros(self.current_settle_us)
    }

    pub fn power_cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.power_cmd_timeout_ms)
    }
}
