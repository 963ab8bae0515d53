//! DeskCNC Settings Crate
//!
//! Handles driver configuration: loading, saving, and validation.

pub mod config;
pub mod error;

pub use config::{
    Config, ConnectionSettings, FirmwareSettings, MachineSettings, TimingSettings,
};
pub use error::{Result, SettingsError};
