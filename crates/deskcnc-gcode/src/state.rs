//! Modal state tracking
//!
//! Tracks the modal groups that persist between lines until changed.

use deskcnc_core::{DistanceMode, MotionMode, Plane, Position, SpindleState, Units};
use serde::{Deserialize, Serialize};

use crate::command::Word;

/// Feed rate in effect before the program sets one (mm/min)
pub const DEFAULT_FEED_RATE: f64 = 300.0;

/// Modal state for G-Code execution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModalState {
    /// Logical tool position (mm)
    pub position: Position,
    /// Current feed rate (mm/min)
    pub feed_rate: f64,
    /// G90/G91
    pub distance_mode: DistanceMode,
    /// G17/G18/G19
    pub plane: Plane,
    /// G20/G21
    pub units: Units,
    /// Last motion command, repeated by parameter-only lines
    pub motion_mode: MotionMode,
    /// M3/M4/M5
    pub spindle: SpindleState,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            position: Position::ZERO,
            feed_rate: DEFAULT_FEED_RATE,
            distance_mode: DistanceMode::Absolute,
            plane: Plane::XY,
            units: Units::MM,
            motion_mode: MotionMode::Linear,
            spindle: SpindleState::Off,
        }
    }
}

impl ModalState {
    /// Create a new modal state with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a given feed rate instead of the default
    pub fn with_feed_rate(feed_rate: f64) -> Self {
        Self {
            feed_rate,
            ..Self::default()
        }
    }

    /// Apply a position or feed word
    ///
    /// In absolute mode X/Y/Z replace the coordinate, in incremental mode
    /// they are added to it. F always replaces the feed rate. Other letters
    /// carry no modal state and are ignored.
    pub fn apply_word(&mut self, word: &Word) {
        let incremental = self.distance_mode == DistanceMode::Incremental;
        let axis = match word.letter {
            'X' => &mut self.position.x,
            'Y' => &mut self.position.y,
            'Z' => &mut self.position.z,
            'F' => {
                self.feed_rate = word.value;
                return;
            }
            _ => return,
        };
        if incremental {
            *axis += word.value;
        } else {
            *axis = word.value;
        }
    }

    /// Apply several words in order
    pub fn apply_words<'a>(&mut self, words: impl IntoIterator<Item = &'a Word>) {
        for word in words {
            self.apply_word(word);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_accumulates() {
        let mut state = ModalState::new();
        state.distance_mode = DistanceMode::Incremental;
        state.apply_words(&[Word::new('X', 10.0), Word::new('X', -3.0)]);
        assert_eq!(state.position.x, 7.0);
    }

    #[test]
    fn test_absolute_replaces() {
        let mut state = ModalState::new();
        state.apply_words(&[Word::new('X', 10.0), Word::new('X', -3.0)]);
        assert_eq!(state.position.x, -3.0);
    }

    #[test]
    fn test_feed_replaces_in_both_modes() {
        let mut state = ModalState::new();
        state.distance_mode = DistanceMode::Incremental;
        state.apply_word(&Word::new('F', 500.0));
        state.apply_word(&Word::new('F', 800.0));
        assert_eq!(state.feed_rate, 800.0);
    }

    #[test]
    fn test_other_letters_ignored() {
        let mut state = ModalState::new();
        state.apply_words(&[Word::new('I', 4.0), Word::new('P', 1.0)]);
        assert_eq!(state, ModalState::new());
    }
}
