//! Configuration and settings management for the DeskCNC driver
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats; the default file lives in the platform config
//! directory.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, read timeout)
//! - Firmware bootstrap resources
//! - Protocol timings (settle delays, backoff, polling)
//! - Machine limits and recovery policy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SettingsError};

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial device; usually given on the command line
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            timeout_ms: 1000,
        }
    }
}

/// Firmware bootstrap resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareSettings {
    /// Hex text file with the firmware image
    pub image_path: PathBuf,
    /// Hex text file with the expected device response
    pub response_path: PathBuf,
    /// Bytes per write while streaming the image
    pub chunk_size: usize,
}

impl Default for FirmwareSettings {
    fn default() -> Self {
        Self {
            image_path: PathBuf::from("firmware.txt"),
            response_path: PathBuf::from("firmware_response.txt"),
            chunk_size: 64,
        }
    }
}

/// Protocol timings, all in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Wait after the reset frame before reading the signature
    pub reset_settle_ms: u64,
    /// Wait between firmware chunks
    pub chunk_delay_ms: u64,
    /// Wait after the last firmware chunk before the final read
    pub firmware_settle_ms: u64,
    /// Wait after a failed open before trying again
    pub reconnect_backoff_ms: u64,
    /// Sleep between ready polls
    pub ready_poll_ms: u64,
    /// Wait after switching the spindle
    pub spindle_settle_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            reset_settle_ms: 50,
            chunk_delay_ms: 5,
            firmware_settle_ms: 50,
            reconnect_backoff_ms: 2000,
            ready_poll_ms: 1,
            spindle_settle_ms: 2000,
        }
    }
}

impl TimingSettings {
    /// `reset_settle_ms` as a duration
    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    /// `chunk_delay_ms` as a duration
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    /// `firmware_settle_ms` as a duration
    pub fn firmware_settle(&self) -> Duration {
        Duration::from_millis(self.firmware_settle_ms)
    }

    /// `reconnect_backoff_ms` as a duration
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// `ready_poll_ms` as a duration
    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    /// `spindle_settle_ms` as a duration
    pub fn spindle_settle(&self) -> Duration {
        Duration::from_millis(self.spindle_settle_ms)
    }
}

/// Machine limits and recovery policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Feed rate before the program sets one (mm/min)
    pub default_feed_rate: f64,
    /// Fastest linear interpolation the hardware supports (mm/min)
    pub max_linear_feed_rate: f64,
    /// Retransmissions after a wrong acknowledgement
    pub max_command_retries: u32,
    /// Stop recovering after this many faults in a row (unbounded if unset)
    pub max_consecutive_faults: Option<u32>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            default_feed_rate: 300.0,
            max_linear_feed_rate: 1620.0,
            max_command_retries: 2,
            max_consecutive_faults: None,
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Firmware bootstrap resources
    pub firmware: FirmwareSettings,
    /// Protocol timings
    pub timing: TimingSettings,
    /// Machine preferences
    pub machine: MachineSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location (`<config dir>/deskcnc/config.toml`)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        path.push("deskcnc");
        path.push("config.toml");
        path
    }

    /// Load an explicit file, or the default file if it exists, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_path = Self::default_path();
                if default_path.is_file() {
                    Self::load_from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)?
        } else {
            return Err(SettingsError::UnsupportedFormat(
                path.display().to_string(),
            ));
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)?
        } else {
            return Err(SettingsError::UnsupportedFormat(
                path.display().to_string(),
            ));
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }

        if self.connection.timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.timeout_ms", "must be > 0"));
        }

        if self.firmware.chunk_size == 0 {
            return Err(SettingsError::invalid("firmware.chunk_size", "must be > 0"));
        }

        if !(self.machine.default_feed_rate > 0.0) {
            return Err(SettingsError::invalid(
                "machine.default_feed_rate",
                "must be > 0",
            ));
        }

        if !(self.machine.max_linear_feed_rate > 0.0) {
            return Err(SettingsError::invalid(
                "machine.max_linear_feed_rate",
                "must be > 0",
            ));
        }

        if self.machine.max_consecutive_faults == Some(0) {
            return Err(SettingsError::invalid(
                "machine.max_consecutive_faults",
                "must be > 0 when set",
            ));
        }

        Ok(())
    }
}
