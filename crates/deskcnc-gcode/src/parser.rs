//! G-Code line parser
//!
//! Turns one text line into a [`Block`]. The parser only checks syntax and
//! groups words; whether the machine can execute a command is decided by the
//! translator.

use deskcnc_core::GcodeError;
use regex::Regex;
use std::sync::OnceLock;

use crate::command::{Block, GCode, GCodeKind, Word};

/// Stateful line parser (tracks the physical line number for errors)
#[derive(Debug, Default)]
pub struct GcodeParser {
    line_count: u32,
}

impl GcodeParser {
    /// Create a new G-Code parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines parsed so far
    pub fn line_count(&self) -> u32 {
        self.line_count
    }

    /// Parse a G-Code line into a block
    pub fn parse(&mut self, line: &str) -> Result<Block, GcodeError> {
        self.line_count += 1;
        let cleaned = remove_comments(line);
        let cleaned = cleaned.trim();

        // Program delimiters and block-delete markers carry no words
        if cleaned.is_empty() || cleaned == "%" {
            return Ok(Block::default());
        }
        let cleaned = cleaned.strip_prefix('/').unwrap_or(cleaned);

        let words = self.tokenize(cleaned)?;
        self.group(words)
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Word>, GcodeError> {
        static WORD_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = WORD_REGEX.get_or_init(|| {
            Regex::new(r"([A-Za-z])\s*([-+]?(?:\d+\.?\d*|\.\d+))").expect("invalid regex pattern")
        });

        let mut words = Vec::new();
        let mut last_end = 0;
        for caps in regex.captures_iter(text) {
            let whole = caps.get(0).expect("capture group 0 always present");
            self.check_gap(&text[last_end..whole.start()])?;
            last_end = whole.end();

            let letter = caps[1].chars().next().unwrap_or_default();
            let value: f64 = caps[2].parse().map_err(|_| self.syntax(format!(
                "invalid number '{}'",
                &caps[2]
            )))?;
            words.push(Word::new(letter, value));
        }
        self.check_gap(&text[last_end..])?;
        Ok(words)
    }

    fn check_gap(&self, gap: &str) -> Result<(), GcodeError> {
        match gap.trim() {
            "" => Ok(()),
            junk => Err(self.syntax(format!("unexpected '{}'", junk))),
        }
    }

    fn group(&self, words: Vec<Word>) -> Result<Block, GcodeError> {
        let mut block = Block::default();
        let mut params = Vec::new();
        let mut motion_index = None;
        let mut other_g_index = None;

        for word in words {
            match word.letter {
                'N' => block.line_number = word.code(),
                'G' => {
                    let kind = GCodeKind::from_g(word);
                    if kind.motion_mode().is_some() {
                        if motion_index.is_some() {
                            return Err(self.syntax("more than one motion command in block"));
                        }
                        motion_index = Some(block.commands.len());
                    } else if matches!(kind, GCodeKind::Other(_)) && other_g_index.is_none() {
                        other_g_index = Some(block.commands.len());
                    }
                    block.commands.push(GCode::new(kind));
                }
                'M' => block.commands.push(GCode::new(GCodeKind::from_m(word))),
                'F' if word.value <= 0.0 => {
                    return Err(self.syntax(format!("feed rate must be positive, got {}", word)))
                }
                'F' => block
                    .commands
                    .push(GCode::with_params(GCodeKind::FeedRate, vec![word])),
                'S' | 'T' => block.commands.push(GCode::new(GCodeKind::Other(word))),
                _ => params.push(word),
            }
        }

        // A motion command claims the axis words, otherwise the first
        // unrecognised G command (G92 X0, G28 X0) does
        match motion_index.or(other_g_index) {
            Some(index) => block.commands[index].params = params,
            None => block.modal_params = params,
        }

        Ok(block)
    }

    fn syntax(&self, reason: impl Into<String>) -> GcodeError {
        GcodeError::InvalidSyntax {
            line_number: self.line_count,
            reason: reason.into(),
        }
    }
}

/// Remove `( ... )` and `; ...` comments from a line
fn remove_comments(line: &str) -> String {
    static COMMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex =
        COMMENT_REGEX.get_or_init(|| Regex::new(r"\([^)]*\)|;.*").expect("invalid regex pattern"));
    regex.replace_all(line, " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Block {
        GcodeParser::new().parse(line).unwrap()
    }

    #[test]
    fn test_motion_claims_axis_words() {
        let block = parse("G1 X10 Y-2.5 Z.5");
        assert_eq!(block.commands.len(), 1);
        assert_eq!(block.commands[0].kind, GCodeKind::LinearMove);
        assert_eq!(
            block.commands[0].params,
            vec![
                Word::new('X', 10.0),
                Word::new('Y', -2.5),
                Word::new('Z', 0.5)
            ]
        );
        assert!(block.modal_params.is_empty());
    }

    #[test]
    fn test_axis_words_without_motion_are_modal() {
        let block = parse("X5 Y6");
        assert!(block.commands.is_empty());
        assert!(block.has_axis_words());
        assert!(!block.has_motion());
    }

    #[test]
    fn test_unrecognised_g_code_claims_axis_words() {
        let block = parse("G92 X0 Y0");
        assert_eq!(block.commands.len(), 1);
        assert!(matches!(block.commands[0].kind, GCodeKind::Other(w) if w.code() == Some(92)));
        assert_eq!(
            block.commands[0].params,
            vec![Word::new('X', 0.0), Word::new('Y', 0.0)]
        );
        assert!(block.modal_params.is_empty());
        assert!(!block.repeats_motion());

        let block = parse("G0 G28 X1");
        assert_eq!(block.commands[0].params, vec![Word::new('X', 1.0)]);
        assert!(block.commands[1].params.is_empty());
    }

    #[test]
    fn test_modal_repeat_rule() {
        assert!(parse("X5").repeats_motion());
        assert!(parse("X5 F200").repeats_motion());
        assert!(!parse("F200").repeats_motion());
        assert!(!parse("G90 X5").repeats_motion());
        assert!(!parse("M3 X5").repeats_motion());
        assert!(!parse("S1000 X5").repeats_motion());
        assert!(!parse("G1 X5").repeats_motion());
    }

    #[test]
    fn test_feed_rate_is_its_own_command() {
        let block = parse("G1 X1 F1200");
        assert_eq!(block.commands.len(), 2);
        assert_eq!(block.commands[1].kind, GCodeKind::FeedRate);
        assert_eq!(block.commands[1].params, vec![Word::new('F', 1200.0)]);
        assert_eq!(block.commands[0].params, vec![Word::new('X', 1.0)]);
    }

    #[test]
    fn test_comments_and_case() {
        let block = parse("n10 g0 (rapid) x1 ; to start");
        assert_eq!(block.line_number, Some(10));
        assert_eq!(block.commands[0].kind, GCodeKind::RapidMove);
        assert_eq!(block.commands[0].params, vec![Word::new('X', 1.0)]);
    }

    #[test]
    fn test_leading_zero_codes_and_spacing() {
        let block = parse("G01X1.5 Y 2");
        assert_eq!(block.commands[0].kind, GCodeKind::LinearMove);
        assert_eq!(block.commands[0].params.len(), 2);
    }

    #[test]
    fn test_empty_and_delimiter_lines() {
        assert!(parse("").is_empty());
        assert!(parse("   ; only a comment").is_empty());
        assert!(parse("%").is_empty());
    }

    #[test]
    fn test_spindle_speed_is_reported_as_other() {
        let block = parse("M3 S1000");
        assert_eq!(block.commands[0].kind, GCodeKind::StartSpindleCw);
        assert!(matches!(block.commands[1].kind, GCodeKind::Other(w) if w.letter == 'S'));
    }

    #[test]
    fn test_syntax_errors_carry_line_number() {
        let mut parser = GcodeParser::new();
        parser.parse("G0 X0").unwrap();
        let err = parser.parse("G1 X#5").unwrap_err();
        assert!(matches!(err, GcodeError::InvalidSyntax { line_number: 2, .. }));
        assert!(parser.parse("G1 X").is_err());
    }

    #[test]
    fn test_non_positive_feed_rate_rejected() {
        let mut parser = GcodeParser::new();
        for line in ["G1 X1 F-100", "F0"] {
            let err = parser.parse(line).unwrap_err();
            assert!(matches!(err, GcodeError::InvalidSyntax { .. }), "{line}");
        }
        assert!(parser.parse("F0.5").is_ok());
    }

    #[test]
    fn test_two_motion_commands_rejected() {
        assert!(GcodeParser::new().parse("G0 G1 X1").is_err());
    }
}
