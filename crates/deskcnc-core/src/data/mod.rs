//! Data models for positions, modal groups, and connection state
//!
//! This module provides:
//! - Three-axis position tracking in millimeters
//! - Modal group enums (distance mode, plane, units, motion, spindle)
//! - The connection state machine of the serial session

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg};

/// Machine coordinate units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Units {
    /// Millimeters (metric)
    #[default]
    MM,
    /// Inches (imperial)
    INCH,
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::MM => write!(f, "mm"),
            Units::INCH => write!(f, "in"),
        }
    }
}

/// Three-axis position in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Origin of the machine coordinate system
    pub const ZERO: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a position with specified coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        debug_assert!(
            x.is_finite() && y.is_finite() && z.is_finite(),
            "Position axes must be finite: x={x}, y={y}, z={z}"
        );
        Self { x, y, z }
    }

    /// True when every axis is exactly zero
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Neg for Position {
    type Output = Position;

    fn neg(self) -> Position {
        Position {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3} Z{:.3}", self.x, self.y, self.z)
    }
}

/// Distance mode (G90/G91)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMode {
    /// Coordinates are targets (G90)
    #[default]
    Absolute,
    /// Coordinates are deltas (G91)
    Incremental,
}

/// Plane selection (G17/G18/G19)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Plane {
    /// G17
    #[default]
    XY,
    /// G18
    ZX,
    /// G19
    YZ,
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plane::XY => write!(f, "XY"),
            Plane::ZX => write!(f, "ZX"),
            Plane::YZ => write!(f, "YZ"),
        }
    }
}

/// Motion mode (G0-G3), remembered for modal repeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionMode {
    /// Rapid positioning (G0)
    Rapid,
    /// Linear interpolation (G1)
    #[default]
    Linear,
    /// Clockwise arc (G2)
    ArcCw,
    /// Counter-clockwise arc (G3)
    ArcCcw,
}

impl fmt::Display for MotionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rapid => write!(f, "G0"),
            Self::Linear => write!(f, "G1"),
            Self::ArcCw => write!(f, "G2"),
            Self::ArcCcw => write!(f, "G3"),
        }
    }
}

/// Spindle state (M3/M4/M5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpindleState {
    /// Stopped
    #[default]
    Off,
    /// Clockwise
    Cw,
    /// Counter-clockwise (recorded only; the hardware spins CW)
    Ccw,
}

impl SpindleState {
    /// Whether the spindle motor should be running
    pub fn is_running(&self) -> bool {
        !matches!(self, SpindleState::Off)
    }
}

/// State of the serial session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No port open
    #[default]
    Disconnected,
    /// Port open, waiting for the reset signature
    Resetting,
    /// Reset accepted, streaming the firmware image
    LoadingFirmware,
    /// Firmware running, idle
    Ready,
    /// A command is in flight
    Executing,
    /// Last operation failed at transport level
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Resetting => "Resetting",
            Self::LoadingFirmware => "LoadingFirmware",
            Self::Ready => "Ready",
            Self::Executing => "Executing",
            Self::Faulted => "Faulted",
        };
        write!(f, "{}", name)
    }
}
