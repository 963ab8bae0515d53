//! # DeskCNC G-Code
//!
//! Typed G-Code words and commands, a line parser producing them, and the
//! modal state they update.

pub mod command;
pub mod parser;
pub mod state;

pub use command::{Block, GCode, GCodeKind, Word};
pub use parser::GcodeParser;
pub use state::{ModalState, DEFAULT_FEED_RATE};
