//! # DeskCNC
//!
//! Serial driver and G-code streamer for HoFaLab DeskCNC milling machines.
//!
//! ## Architecture
//!
//! The driver is organized as a workspace with multiple crates:
//!
//! 1. **deskcnc-core** - Error taxonomy and machine data model
//! 2. **deskcnc-gcode** - G-code words, line parser, modal state
//! 3. **deskcnc-communication** - Serial transport, frame codec, session,
//!    executor, and the modal translator
//! 4. **deskcnc-settings** - TOML/JSON configuration
//! 5. **deskcnc** - The `deskcnc` and `sensor2gcode` binaries
//!
//! This crate wires settings into a ready-to-connect translator and builds
//! the log dispatch the binaries run under.

pub mod logging;

use anyhow::Context;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub use deskcnc_communication::{
    CommandExecutor, ConnectionParams, DeskCncController, DeviceSession, FirmwareImage,
    PortOpener, SerialPortOpener, SessionTimings, StreamSummary,
};
pub use deskcnc_core::{ConnectionState, Error, Position, Result};
pub use deskcnc_gcode::{GcodeParser, ModalState};
pub use deskcnc_settings::{Config, TimingSettings};
pub use logging::{build_dispatch, LogFormat, LogLevel};

/// Bring-up delays from the timing settings
pub fn session_timings(timing: &TimingSettings) -> SessionTimings {
    SessionTimings {
        reset_settle: timing.reset_settle(),
        chunk_delay: timing.chunk_delay(),
        firmware_settle: timing.firmware_settle(),
        reconnect_backoff: timing.reconnect_backoff(),
    }
}

/// Serial parameters from the connection settings
pub fn connection_params(config: &Config) -> ConnectionParams {
    ConnectionParams::serial(&config.connection.port)
        .with_baud_rate(config.connection.baud_rate)
        .with_timeout_ms(config.connection.timeout_ms)
}

/// Build a disconnected translator for the operating system's serial ports
pub fn build_controller(
    config: &Config,
    interrupt: Arc<AtomicBool>,
) -> anyhow::Result<DeskCncController> {
    build_controller_with(SerialPortOpener, config, interrupt)
}

/// Build a disconnected translator that opens ports through `opener`
///
/// Reads the firmware resources; call [`DeskCncController::connect`] to
/// bring the device up.
pub fn build_controller_with(
    opener: impl PortOpener + 'static,
    config: &Config,
    interrupt: Arc<AtomicBool>,
) -> anyhow::Result<DeskCncController> {
    let firmware = FirmwareImage::load(&config.firmware.image_path, &config.firmware.response_path)
        .context("loading firmware resources")?;

    let session = DeviceSession::new(opener, connection_params(config), firmware)
        .with_timings(session_timings(&config.timing))
        .with_chunk_size(config.firmware.chunk_size)
        .with_interrupt(interrupt);

    let executor = CommandExecutor::new(session)
        .with_max_retries(config.machine.max_command_retries)
        .with_ready_poll(config.timing.ready_poll());

    Ok(DeskCncController::new(executor)
        .with_modal_state(ModalState::with_feed_rate(config.machine.default_feed_rate))
        .with_max_linear_feed_rate(config.machine.max_linear_feed_rate)
        .with_spindle_settle(config.timing.spindle_settle())
        .with_max_consecutive_faults(config.machine.max_consecutive_faults))
}
