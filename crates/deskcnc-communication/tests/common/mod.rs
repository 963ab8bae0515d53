//! In-memory DeskCNC device for driving sessions end to end
#![allow(dead_code)]

use deskcnc_communication::firmware::deskcnc::frame::{
    decode_steps, ACK_ACCEPTED, DONE_MARKER, FRAME_LEN, OPCODE_LINEAR, OPCODE_RAPID,
    OPCODE_SPINDLE, OPCODE_STATUS, RESET_FRAME, RESET_SIGNATURE, STATUS_RESPONSE_LEN,
};
use deskcnc_communication::{
    CommandExecutor, ConnectionParams, DeskCncController, DeviceSession, FirmwareImage,
    PortOpener, SerialPort, SessionTimings,
};
use deskcnc_core::{ConnectionError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

pub const IMAGE_LEN: usize = 150;

/// Image bytes 0..150; the loader echoes each byte inverted
pub fn firmware() -> FirmwareImage {
    let image: Vec<u8> = (0..IMAGE_LEN as u8).collect();
    let echo: Vec<u8> = image.iter().map(|b| b ^ 0xFF).collect();
    FirmwareImage::from_bytes(image, echo)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Boot,
    Loading { received: usize, corrupt: bool },
    Running,
}

/// What the device does and what it has seen
#[derive(Debug)]
pub struct DeviceState {
    // script
    pub open_failures: u32,
    pub bad_reset_signatures: u32,
    pub bad_firmware_echoes: u32,
    /// Acknowledgements for upcoming commands; `None` sends nothing
    pub acks: VecDeque<Option<u8>>,
    /// Busy answers before each command completes
    pub busy_polls: u32,
    /// Fail the command write made when this many commands were accepted
    pub fail_on_command: Option<usize>,
    pub fail_all_commands: bool,
    pub silent_status: u32,

    // log
    pub open_attempts: u32,
    pub opens: u32,
    pub resets: u32,
    pub uploads: u32,
    pub firmware_writes: Vec<usize>,
    pub status_queries: u32,
    pub commands: Vec<Vec<u8>>,

    mode: Mode,
    busy_remaining: u32,
    rx: VecDeque<u8>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            open_failures: 0,
            bad_reset_signatures: 0,
            bad_firmware_echoes: 0,
            acks: VecDeque::new(),
            busy_polls: 0,
            fail_on_command: None,
            fail_all_commands: false,
            silent_status: 0,
            open_attempts: 0,
            opens: 0,
            resets: 0,
            uploads: 0,
            firmware_writes: Vec::new(),
            status_queries: 0,
            commands: Vec::new(),
            mode: Mode::Boot,
            busy_remaining: 0,
            rx: VecDeque::new(),
        }
    }
}

impl DeviceState {
    fn handle_write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data == RESET_FRAME {
            self.resets += 1;
            if self.bad_reset_signatures > 0 {
                self.bad_reset_signatures -= 1;
                self.rx.extend([0x00, 0x11]);
            } else {
                self.rx.push_back(0xAA);
                self.rx.extend(RESET_SIGNATURE);
            }
            self.mode = Mode::Loading {
                received: 0,
                corrupt: false,
            };
            return Ok(data.len());
        }

        match self.mode {
            Mode::Boot => Ok(data.len()),
            Mode::Loading { received, corrupt } => {
                self.firmware_writes.push(data.len());
                let corrupt = if received == 0 && self.bad_firmware_echoes > 0 {
                    self.bad_firmware_echoes -= 1;
                    true
                } else {
                    corrupt
                };
                for (i, byte) in data.iter().enumerate() {
                    let echo = byte ^ 0xFF;
                    let flipped = corrupt && received + i == 0;
                    self.rx.push_back(if flipped { echo ^ 0x01 } else { echo });
                }
                let received = received + data.len();
                self.mode = if received < IMAGE_LEN {
                    Mode::Loading { received, corrupt }
                } else if corrupt {
                    // Loader is still waiting for a good image
                    Mode::Loading {
                        received: 0,
                        corrupt: false,
                    }
                } else {
                    self.uploads += 1;
                    Mode::Running
                };
                Ok(data.len())
            }
            Mode::Running => self.handle_frame(data),
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        assert_eq!(frame.len(), FRAME_LEN, "partial frame written");
        let opcode = [frame[0], frame[1]];

        if opcode == OPCODE_STATUS {
            self.status_queries += 1;
            if self.silent_status > 0 {
                self.silent_status -= 1;
                return Ok(frame.len());
            }
            self.rx.extend([0u8; STATUS_RESPONSE_LEN - 1]);
            if self.busy_remaining > 0 {
                self.busy_remaining -= 1;
                self.rx.push_back(0x00);
            } else {
                self.rx.push_back(DONE_MARKER);
            }
            return Ok(frame.len());
        }

        if [OPCODE_RAPID, OPCODE_LINEAR, OPCODE_SPINDLE].contains(&opcode) {
            if self.fail_all_commands || self.fail_on_command == Some(self.commands.len()) {
                self.fail_on_command = None;
                // Power glitch: the firmware is gone until the next upload
                self.mode = Mode::Boot;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            self.commands.push(frame.to_vec());
            if let Some(ack) = self.acks.pop_front().unwrap_or(Some(ACK_ACCEPTED)) {
                self.rx.push_back(ack);
            }
            self.busy_remaining = self.busy_polls;
        }
        Ok(frame.len())
    }
}

/// Shared handle to one simulated controller
#[derive(Debug, Clone, Default)]
pub struct ScriptedDevice(Arc<Mutex<DeviceState>>);

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, f: impl FnOnce(&mut DeviceState)) -> &Self {
        f(&mut self.0.lock());
        self
    }

    pub fn inspect<T>(&self, f: impl FnOnce(&DeviceState) -> T) -> T {
        f(&self.0.lock())
    }

    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.inspect(|d| d.commands.clone())
    }

    pub fn last_command(&self) -> Vec<u8> {
        self.commands().last().cloned().expect("no command sent")
    }

    pub fn session(&self) -> DeviceSession {
        DeviceSession::new(self.clone(), ConnectionParams::serial("sim0"), firmware())
            .with_timings(SessionTimings::immediate())
    }

    pub fn executor(&self) -> CommandExecutor {
        CommandExecutor::new(self.session()).with_ready_poll(Duration::ZERO)
    }

    /// Translator that has completed its initial bring-up
    pub fn controller(&self) -> DeskCncController {
        let mut controller =
            DeskCncController::new(self.executor()).with_spindle_settle(Duration::ZERO);
        controller.connect().expect("bring-up");
        controller
    }
}

impl PortOpener for ScriptedDevice {
    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn SerialPort>> {
        let mut device = self.0.lock();
        device.open_attempts += 1;
        if device.open_failures > 0 {
            device.open_failures -= 1;
            return Err(ConnectionError::FailedToOpen {
                port: params.port.clone(),
                reason: "no such device".to_string(),
            }
            .into());
        }
        device.opens += 1;
        device.rx.clear();
        Ok(Box::new(ScriptedPort(self.clone())))
    }
}

struct ScriptedPort(ScriptedDevice);

impl SerialPort for ScriptedPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0 .0.lock().handle_write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut device = self.0 .0.lock();
        if device.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }
        let n = buf.len().min(device.rx.len());
        for (slot, byte) in buf.iter_mut().zip(device.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.0 .0.lock().rx.len())
    }

    fn name(&self) -> String {
        "sim0".to_string()
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Step counts (X as sent, Y, Z) of a motion frame
pub fn target_steps(frame: &[u8]) -> (i32, i32, i32) {
    let word = |at: usize| decode_steps([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]]);
    (word(2), word(6), word(10))
}

/// Encoded feed of a motion frame
pub fn feed_value(frame: &[u8]) -> u16 {
    u16::from_le_bytes([frame[14], frame[15]])
}
