//! Device session: port ownership, reset, and firmware upload
//!
//! A session owns at most one open port. Bring-up is
//! open -> reset (until the signature arrives) -> firmware upload (until the
//! echo matches) -> ready. Any transport failure during bring-up closes the
//! port and starts over after a backoff.

use super::bootstrap::FirmwareImage;
use super::frame::{to_hex, RESET_FRAME, RESET_SIGNATURE};
use crate::communication::serial::{PortOpener, SerialPort};
use crate::communication::ConnectionParams;
use deskcnc_core::{ConnectionError, ConnectionState, ControllerError, Error, Result};
use parking_lot::RwLock;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Delays used during bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// After the reset frame, before reading the signature
    pub reset_settle: Duration,
    /// Between firmware chunks
    pub chunk_delay: Duration,
    /// After the last firmware chunk
    pub firmware_settle: Duration,
    /// Before reopening after a failure
    pub reconnect_backoff: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            reset_settle: Duration::from_millis(50),
            chunk_delay: Duration::from_millis(5),
            firmware_settle: Duration::from_millis(50),
            reconnect_backoff: Duration::from_secs(2),
        }
    }
}

impl SessionTimings {
    /// No delays at all (scripted devices)
    pub fn immediate() -> Self {
        Self {
            reset_settle: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            firmware_settle: Duration::ZERO,
            reconnect_backoff: Duration::ZERO,
        }
    }
}

/// Read-only view of a session's connection state
#[derive(Debug, Clone)]
pub struct SessionStateHandle(Arc<RwLock<ConnectionState>>);

impl SessionStateHandle {
    /// Current state
    pub fn get(&self) -> ConnectionState {
        *self.0.read()
    }
}

/// Owns the serial link to one controller
pub struct DeviceSession {
    opener: Box<dyn PortOpener>,
    params: ConnectionParams,
    firmware: FirmwareImage,
    chunk_size: usize,
    timings: SessionTimings,
    port: Option<Box<dyn SerialPort>>,
    state: Arc<RwLock<ConnectionState>>,
    interrupt: Arc<AtomicBool>,
    restarts: u32,
}

impl DeviceSession {
    /// Default firmware upload chunk
    pub const DEFAULT_CHUNK_SIZE: usize = 64;

    /// Create a disconnected session
    pub fn new(
        opener: impl PortOpener + 'static,
        params: ConnectionParams,
        firmware: FirmwareImage,
    ) -> Self {
        Self {
            opener: Box::new(opener),
            params,
            firmware,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            timings: SessionTimings::default(),
            port: None,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            interrupt: Arc::new(AtomicBool::new(false)),
            restarts: 0,
        }
    }

    /// Replace the bring-up delays
    pub fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Firmware bytes per write (zero is treated as one)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Share an interrupt flag that cancels bring-up
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Connection parameters
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Bring-up delays
    pub fn timings(&self) -> &SessionTimings {
        &self.timings
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Handle for observing the state from elsewhere
    pub fn state_handle(&self) -> SessionStateHandle {
        SessionStateHandle(Arc::clone(&self.state))
    }

    /// The flag checked by the bring-up loops
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Completed restarts since creation
    pub fn restart_count(&self) -> u32 {
        self.restarts
    }

    /// True while a port is open
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.write();
        if *current != state {
            tracing::trace!("Connection state {} -> {}", *current, state);
            *current = state;
        }
    }

    /// Open the port; the device still needs a reset and firmware
    pub fn open(&mut self) -> Result<()> {
        self.close();
        let port = self.opener.open(&self.params)?;
        tracing::info!("Successfully opened {}", port.name());
        self.port = Some(port);
        self.set_state(ConnectionState::Resetting);
        Ok(())
    }

    /// Release the port if one is open
    pub fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.close() {
                tracing::debug!("Error closing {}: {}", port.name(), e);
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Write every byte of `data`
    pub fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        while !data.is_empty() {
            match port.write(data) {
                Ok(0) => {
                    return Err(ConnectionError::IoError {
                        reason: "port accepted no bytes".to_string(),
                    }
                    .into())
                }
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ConnectionError::from(e).into()),
            }
        }
        Ok(())
    }

    /// Read until `len` bytes arrive or the port times out
    ///
    /// A timeout is not an error; the caller gets whatever arrived.
    pub fn read_up_to(&mut self, len: usize) -> Result<Vec<u8>> {
        let port = self.port_mut()?;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    break
                }
                Err(e) => return Err(ConnectionError::from(e).into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Drain whatever the device has already sent
    pub fn read_available(&mut self) -> Result<Vec<u8>> {
        let waiting = self
            .port_mut()?
            .bytes_to_read()
            .map_err(ConnectionError::from)?;
        if waiting == 0 {
            return Ok(Vec::new());
        }
        self.read_up_to(waiting)
    }

    /// Send the reset frame; true if the device answered with its signature
    pub fn reset(&mut self) -> Result<bool> {
        self.set_state(ConnectionState::Resetting);
        tracing::info!("Resetting device");
        self.write_all(&RESET_FRAME)?;
        std::thread::sleep(self.timings.reset_settle);

        let response = self.read_available()?;
        tracing::debug!("Reset response: {}", to_hex(&response));
        Ok(response.ends_with(&RESET_SIGNATURE))
    }

    /// Upload the firmware image; true if the echo matched
    pub fn load_firmware(&mut self) -> Result<bool> {
        self.set_state(ConnectionState::LoadingFirmware);
        tracing::info!("Sending firmware");

        let firmware = self.firmware.clone();
        let mut response = Vec::with_capacity(firmware.expected_response().len());
        for chunk in firmware.image().chunks(self.chunk_size) {
            self.write_all(chunk)?;
            std::thread::sleep(self.timings.chunk_delay);
            response.extend(self.read_available()?);
        }
        std::thread::sleep(self.timings.firmware_settle);
        response.extend(self.read_available()?);

        if response == firmware.expected_response() {
            tracing::info!("Firmware loaded");
            Ok(true)
        } else {
            tracing::error!(
                received = response.len(),
                expected = firmware.expected_response().len(),
                "Firmware response mismatch"
            );
            Ok(false)
        }
    }

    /// Close, reopen, reset and reload until the device is ready
    ///
    /// Transport failures are retried after the reconnect backoff with no
    /// attempt limit; only the interrupt flag ends the loop early.
    pub fn restart(&mut self) -> Result<()> {
        tracing::info!("Starting device on {}", self.params.port);
        self.close();
        let mut attempt = 0u32;
        loop {
            self.check_interrupt()?;
            attempt += 1;
            tracing::debug!(attempt, "Bring-up attempt");
            match self.bring_up() {
                Ok(()) => {
                    self.restarts += 1;
                    self.set_state(ConnectionState::Ready);
                    tracing::info!(attempts = attempt, "Device ready");
                    return Ok(());
                }
                Err(Error::Connection(e)) => {
                    tracing::warn!(
                        "Bring-up failed: {}; retrying in {:?}",
                        e,
                        self.timings.reconnect_backoff
                    );
                    self.close();
                    std::thread::sleep(self.timings.reconnect_backoff);
                }
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
    }

    fn bring_up(&mut self) -> Result<()> {
        self.open()?;
        while !self.reset()? {
            tracing::warn!("Reset signature not received, resending");
            self.check_interrupt()?;
        }
        while !self.load_firmware()? {
            self.check_interrupt()?;
        }
        Ok(())
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.load(Ordering::SeqCst) {
            tracing::info!("Bring-up interrupted");
            return Err(ControllerError::Cancelled.into());
        }
        Ok(())
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("params", &self.params)
            .field("state", &self.state())
            .field("open", &self.is_open())
            .field("restarts", &self.restarts)
            .finish()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}
