//! Typed G-Code words and commands
//!
//! A parsed line is a [`Block`]: the commands it carries (each with the
//! parameter words it claims) plus the modal parameter words nobody claimed.

use deskcnc_core::MotionMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single `letter value` pair, e.g. `X10.5`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// Upper-case address letter
    pub letter: char,
    /// Numeric value
    pub value: f64,
}

impl Word {
    /// Create a word; the letter is normalised to upper case
    pub fn new(letter: char, value: f64) -> Self {
        Self {
            letter: letter.to_ascii_uppercase(),
            value,
        }
    }

    /// Integer code for G/M words (`G01` -> 1), `None` for fractional codes like `G38.2`
    pub fn code(&self) -> Option<u32> {
        if self.value >= 0.0 && self.value.fract() == 0.0 && self.value <= u32::MAX as f64 {
            Some(self.value as u32)
        } else {
            None
        }
    }

    /// X, Y or Z
    pub fn is_axis(&self) -> bool {
        matches!(self.letter, 'X' | 'Y' | 'Z')
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.value)
    }
}

/// Every command kind the translator knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GCodeKind {
    /// G0
    RapidMove,
    /// G1
    LinearMove,
    /// G2
    ArcMoveCw,
    /// G3
    ArcMoveCcw,
    /// G17
    SelectXyPlane,
    /// G18
    SelectZxPlane,
    /// G19
    SelectYzPlane,
    /// G20
    UseInches,
    /// G21
    UseMillimeters,
    /// G90
    AbsoluteDistance,
    /// G91
    IncrementalDistance,
    /// G94
    UnitsPerMinute,
    /// F word
    FeedRate,
    /// M3
    StartSpindleCw,
    /// M4
    StartSpindleCcw,
    /// M5
    StopSpindle,
    /// M9
    CoolantOff,
    /// Anything else, kept for reporting
    Other(Word),
}

impl GCodeKind {
    /// Map a G word to its kind
    pub fn from_g(word: Word) -> Self {
        match word.code() {
            Some(0) => Self::RapidMove,
            Some(1) => Self::LinearMove,
            Some(2) => Self::ArcMoveCw,
            Some(3) => Self::ArcMoveCcw,
            Some(17) => Self::SelectXyPlane,
            Some(18) => Self::SelectZxPlane,
            Some(19) => Self::SelectYzPlane,
            Some(20) => Self::UseInches,
            Some(21) => Self::UseMillimeters,
            Some(90) => Self::AbsoluteDistance,
            Some(91) => Self::IncrementalDistance,
            Some(94) => Self::UnitsPerMinute,
            _ => Self::Other(word),
        }
    }

    /// Map an M word to its kind
    pub fn from_m(word: Word) -> Self {
        match word.code() {
            Some(3) => Self::StartSpindleCw,
            Some(4) => Self::StartSpindleCcw,
            Some(5) => Self::StopSpindle,
            Some(9) => Self::CoolantOff,
            _ => Self::Other(word),
        }
    }

    /// Kind for a motion mode
    pub fn from_motion_mode(mode: MotionMode) -> Self {
        match mode {
            MotionMode::Rapid => Self::RapidMove,
            MotionMode::Linear => Self::LinearMove,
            MotionMode::ArcCw => Self::ArcMoveCw,
            MotionMode::ArcCcw => Self::ArcMoveCcw,
        }
    }

    /// Motion mode this kind selects, if it is a motion command
    pub fn motion_mode(&self) -> Option<MotionMode> {
        match self {
            Self::RapidMove => Some(MotionMode::Rapid),
            Self::LinearMove => Some(MotionMode::Linear),
            Self::ArcMoveCw => Some(MotionMode::ArcCw),
            Self::ArcMoveCcw => Some(MotionMode::ArcCcw),
            _ => None,
        }
    }

    /// Position within a block's execution sequence (lower runs first)
    ///
    /// Feed settings come before the spindle, the spindle before modal
    /// switches, and motion runs last among recognised commands.
    pub fn execution_order(&self) -> u16 {
        match self {
            Self::UnitsPerMinute => 30,
            Self::FeedRate => 40,
            Self::StartSpindleCw | Self::StartSpindleCcw | Self::StopSpindle => 90,
            Self::CoolantOff => 110,
            Self::SelectXyPlane | Self::SelectZxPlane | Self::SelectYzPlane => 150,
            Self::UseInches | Self::UseMillimeters => 160,
            Self::AbsoluteDistance | Self::IncrementalDistance => 210,
            Self::RapidMove | Self::LinearMove | Self::ArcMoveCw | Self::ArcMoveCcw => 240,
            Self::Other(_) => 300,
        }
    }
}

impl fmt::Display for GCodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RapidMove => write!(f, "G0"),
            Self::LinearMove => write!(f, "G1"),
            Self::ArcMoveCw => write!(f, "G2"),
            Self::ArcMoveCcw => write!(f, "G3"),
            Self::SelectXyPlane => write!(f, "G17"),
            Self::SelectZxPlane => write!(f, "G18"),
            Self::SelectYzPlane => write!(f, "G19"),
            Self::UseInches => write!(f, "G20"),
            Self::UseMillimeters => write!(f, "G21"),
            Self::AbsoluteDistance => write!(f, "G90"),
            Self::IncrementalDistance => write!(f, "G91"),
            Self::UnitsPerMinute => write!(f, "G94"),
            Self::FeedRate => write!(f, "F"),
            Self::StartSpindleCw => write!(f, "M3"),
            Self::StartSpindleCcw => write!(f, "M4"),
            Self::StopSpindle => write!(f, "M5"),
            Self::CoolantOff => write!(f, "M9"),
            Self::Other(word) => write!(f, "{}", word),
        }
    }
}

/// A command together with the parameter words it claimed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GCode {
    /// What to do
    pub kind: GCodeKind,
    /// Words applied to the modal state before the command runs
    pub params: Vec<Word>,
}

impl GCode {
    /// Command without parameters
    pub fn new(kind: GCodeKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
        }
    }

    /// Command with parameters
    pub fn with_params(kind: GCodeKind, params: Vec<Word>) -> Self {
        Self { kind, params }
    }

    /// Bare motion command for modal repeat
    pub fn motion(mode: MotionMode) -> Self {
        Self::new(GCodeKind::from_motion_mode(mode))
    }
}

impl fmt::Display for GCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            // F carries its value as its only parameter
            GCodeKind::FeedRate => match self.params.first() {
                Some(word) => write!(f, "{}", word),
                None => write!(f, "F"),
            },
            kind => {
                write!(f, "{}", kind)?;
                for word in &self.params {
                    write!(f, " {}", word)?;
                }
                Ok(())
            }
        }
    }
}

/// One parsed line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// `N` word, if present
    pub line_number: Option<u32>,
    /// Commands in source order
    pub commands: Vec<GCode>,
    /// Parameter words not claimed by any command
    pub modal_params: Vec<Word>,
}

impl Block {
    /// True when the line carried neither commands nor words
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.modal_params.is_empty()
    }

    /// True when one of the commands is G0-G3
    pub fn has_motion(&self) -> bool {
        self.commands
            .iter()
            .any(|cmd| cmd.kind.motion_mode().is_some())
    }

    /// True when an unclaimed X, Y or Z word is present
    pub fn has_axis_words(&self) -> bool {
        self.modal_params.iter().any(Word::is_axis)
    }

    /// True when the line re-issues the active motion mode
    ///
    /// Only lines made of unclaimed axis words, optionally with a feed
    /// rate, repeat the last motion. Any other command on the line
    /// suppresses the repeat.
    pub fn repeats_motion(&self) -> bool {
        self.has_axis_words()
            && self
                .commands
                .iter()
                .all(|cmd| cmd.kind == GCodeKind::FeedRate)
    }

    /// Commands in execution order; ties keep source order
    pub fn sorted_commands(&self) -> Vec<&GCode> {
        let mut commands: Vec<&GCode> = self.commands.iter().collect();
        commands.sort_by_key(|cmd| cmd.kind.execution_order());
        commands
    }
}
