//! DeskCNC frame codec
//!
//! Every frame is a 2-byte opcode, a 21-byte payload and a trailing XOR
//! checksum over the preceding 23 bytes.
//!
//! Coordinates travel as little-endian signed step counts (1 step =
//! 0.015 mm, truncated toward zero). Feed rates travel as a little-endian
//! step period `3_378_400 / feed`, so a smaller value means faster motion.

use deskcnc_core::Position;

/// Millimeters per motor step
pub const STEP_MM: f64 = 0.015;

/// Feed rate numerator of the step period encoding
pub const FEEDRATE_CONSTANT: f64 = 3_378_400.0;

/// Fastest encodable step period (low clamp bound)
pub const MAX_FEEDRATE: u16 = 1250;

/// Slowest encodable step period (high clamp bound)
pub const MIN_FEEDRATE: u16 = 62500;

/// Bytes between opcode and checksum
pub const PAYLOAD_LEN: usize = 21;

/// Opcode + payload + checksum
pub const FRAME_LEN: usize = 2 + PAYLOAD_LEN + 1;

/// Reset frame, checksum included
pub const RESET_FRAME: [u8; FRAME_LEN] = [
    0x40, 0x52, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x12,
];

/// Last five bytes the device sends after accepting a reset
pub const RESET_SIGNATURE: [u8; 5] = [0xFB, 0x32, 0x32, 0x34, 0xF5];

/// Acknowledgement of an accepted command
pub const ACK_ACCEPTED: u8 = 0x02;

/// Final byte of a status response when the machine is idle
pub const DONE_MARKER: u8 = 0xEC;

/// Bytes in a status response (position echo + marker)
pub const STATUS_RESPONSE_LEN: usize = 18;

/// Status query opcode
pub const OPCODE_STATUS: [u8; 2] = [0x40, 0x57];
/// Rapid move opcode
pub const OPCODE_RAPID: [u8; 2] = [0x40, 0x4E];
/// Linear move opcode
pub const OPCODE_LINEAR: [u8; 2] = [0x40, 0x4D];
/// Spindle switch opcode
pub const OPCODE_SPINDLE: [u8; 2] = [0x40, 0x4F];

const RAPID_MARKER: [u8; 2] = [0xDB, 0x00];

/// Step count for a distance in millimeters, truncated toward zero
pub fn position_steps(mm: f64) -> i32 {
    (mm / STEP_MM) as i32
}

/// Encode a coordinate as 4 little-endian signed bytes
pub fn encode_position(mm: f64) -> [u8; 4] {
    position_steps(mm).to_le_bytes()
}

/// Inverse of [`encode_position`] at step resolution
pub fn decode_steps(bytes: [u8; 4]) -> i32 {
    i32::from_le_bytes(bytes)
}

/// Step period for a feed rate, clamped into the hardware range
///
/// An infinite feed rate yields [`MAX_FEEDRATE`]; zero or an undefined
/// rate yields [`MIN_FEEDRATE`].
pub fn feedrate_value(mm_per_min: f64) -> u16 {
    let period = (FEEDRATE_CONSTANT / mm_per_min).round();
    if period.is_nan() {
        return MIN_FEEDRATE;
    }
    period.clamp(MAX_FEEDRATE as f64, MIN_FEEDRATE as f64) as u16
}

/// Encode a feed rate as 2 little-endian unsigned bytes
pub fn encode_feedrate(mm_per_min: f64) -> [u8; 2] {
    feedrate_value(mm_per_min).to_le_bytes()
}

/// XOR of every byte
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Opcode, payload and trailing checksum
pub fn build_frame(opcode: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(opcode.len() + payload.len() + 1);
    frame.extend_from_slice(&opcode);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    frame
}

/// True when the last byte is the XOR of all others
pub fn verify_frame(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&sum, body)) => checksum(body) == sum,
        None => false,
    }
}

/// Lower-case hex rendering for logs
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Commands the host sends once the firmware is running
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    /// Ask whether the last motion has finished
    StatusQuery,
    /// Move at maximum speed
    RapidMove {
        /// Machine target (already offset)
        target: Position,
    },
    /// Move in a straight line at a feed rate
    LinearMove {
        /// Machine target (already offset)
        target: Position,
        /// mm/min
        feed_rate: f64,
    },
    /// Switch the spindle motor
    Spindle {
        /// Running (clockwise) or stopped
        on: bool,
    },
}

impl DeviceCommand {
    /// Frame opcode
    pub fn opcode(&self) -> [u8; 2] {
        match self {
            Self::StatusQuery => OPCODE_STATUS,
            Self::RapidMove { .. } => OPCODE_RAPID,
            Self::LinearMove { .. } => OPCODE_LINEAR,
            Self::Spindle { .. } => OPCODE_SPINDLE,
        }
    }

    /// Frame payload (always [`PAYLOAD_LEN`] bytes)
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        match *self {
            Self::StatusQuery => {
                payload.extend_from_slice(&[0; 14]);
                payload.extend_from_slice(&[0x01, 0x01]);
                payload.extend_from_slice(&[0; 5]);
            }
            Self::RapidMove { target } => {
                payload.extend_from_slice(&encode_target(target));
                payload.extend_from_slice(&encode_feedrate(f64::INFINITY));
                payload.extend_from_slice(&RAPID_MARKER);
                payload.extend_from_slice(&[0; 5]);
            }
            Self::LinearMove { target, feed_rate } => {
                payload.extend_from_slice(&encode_target(target));
                payload.extend_from_slice(&encode_feedrate(feed_rate));
                payload.extend_from_slice(&[0; 7]);
            }
            Self::Spindle { on } => {
                payload.extend_from_slice(&[0; 14]);
                payload.push(0x02);
                payload.push(u8::from(on));
                payload.extend_from_slice(&[0; 5]);
            }
        }
        payload
    }

    /// Complete frame including checksum
    pub fn frame(&self) -> Vec<u8> {
        build_frame(self.opcode(), &self.payload())
    }
}

/// X is mirrored on this machine
fn encode_target(target: Position) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[0..4].copy_from_slice(&encode_position(-target.x));
    out[4..8].copy_from_slice(&encode_position(target.y));
    out[8..12].copy_from_slice(&encode_position(target.z));
    out
}
