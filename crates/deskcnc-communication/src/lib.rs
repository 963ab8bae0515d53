//! # DeskCNC Communication
//!
//! Serial transport and the DeskCNC controller protocol: frame codec,
//! firmware bootstrap, acknowledged command execution, and the modal G-code
//! translator that recovers from transport faults.

pub mod communication;
pub mod firmware;

pub use communication::{
    serial::{list_ports, PortOpener, RealSerialPort, SerialPort, SerialPortInfo, SerialPortOpener},
    ConnectionParams, SerialParity,
};

pub use firmware::deskcnc::{
    CommandExecutor, DeskCncController, DeviceCommand, DeviceSession, FirmwareImage,
    SessionStateHandle, SessionTimings, StreamSummary,
};
