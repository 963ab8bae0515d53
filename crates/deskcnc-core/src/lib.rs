//! # DeskCNC Core
//!
//! Core types shared by every crate of the DeskCNC driver: the error
//! taxonomy and the machine data model.

pub mod data;
pub mod error;

pub use data::{
    ConnectionState, DistanceMode, MotionMode, Plane, Position, SpindleState, Units,
};

pub use error::{
    ConnectionError, ControllerError, Error, FirmwareError, GcodeError, ProtocolError, Result,
};
