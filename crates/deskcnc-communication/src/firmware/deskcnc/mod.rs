//! DeskCNC controller support
//!
//! Layers, bottom-up:
//! - [`frame`]: byte-exact frame codec
//! - [`bootstrap`]: firmware image resources
//! - [`session`]: port ownership, reset, firmware upload, restart
//! - [`executor`]: acknowledged command execution with ready polling
//! - [`controller`]: modal G-code translation and fault recovery

pub mod bootstrap;
pub mod controller;
pub mod executor;
pub mod frame;
pub mod session;

pub use bootstrap::{parse_hex_bytes, FirmwareImage};
pub use controller::{DeskCncController, StreamSummary, MAX_LINEAR_FEED_RATE};
pub use executor::CommandExecutor;
pub use frame::DeviceCommand;
pub use session::{DeviceSession, SessionStateHandle, SessionTimings};
