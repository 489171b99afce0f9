//! G-code word parser.
//!
//! Minimal grammar sufficient for streaming: `N`, `G0 G1 G17 G18 G19 G20
//! G21 G90 G91`, `F` and the configured axis words. Whitespace is ignored,
//! letters are case-insensitive, `( … )` and `;` comments are dropped.
//!
//! The parser is stateless with respect to modal state; it only reports the
//! words present on the line. Modal state belongs to the planner.

use core::fmt::Write as _;

use cnc_common::axis::Axis;
use cnc_common::consts::{LINE_BUFFER_CAPACITY, MAX_AXES};
use cnc_common::gcode::{DistanceMode, MotionMode, ParsedMove, Plane, Units};
use cnc_common::protocol::StatusCode;
use heapless::{String, Vec};
use thiserror::Error;

/// Capacity of the stored last-error message.
const ERROR_MESSAGE_CAPACITY: usize = 64;

/// Longest accepted numeric literal.
const NUMBER_CAPACITY: usize = 24;

/// Line-level parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Expected command letter, found '{0}'")]
    ExpectedCommandLetter(char),

    #[error("Bad number format after '{0}'")]
    BadNumberFormat(char),

    #[error("Invalid statement")]
    InvalidStatement,

    #[error("Negative value for '{0}'")]
    NegativeValue(char),

    #[error("Axis '{0}' not configured")]
    AxisNotConfigured(char),

    #[error("Unsupported command {0}{1}")]
    UnsupportedCommand(char, u32),

    #[error("Unsupported word '{0}'")]
    UnsupportedWord(char),

    #[error("Modal group violation at G{0}")]
    ModalGroupViolation(u32),

    #[error("Repeated word '{0}'")]
    RepeatedWord(char),
}

impl ParseError {
    /// Wire status code for this error.
    pub const fn code(&self) -> StatusCode {
        match self {
            Self::ExpectedCommandLetter(_) => StatusCode::ExpectedCommandLetter,
            Self::BadNumberFormat(_) => StatusCode::BadNumberFormat,
            Self::InvalidStatement => StatusCode::InvalidStatement,
            Self::NegativeValue(_) => StatusCode::NegativeValue,
            Self::AxisNotConfigured(_) => StatusCode::AxisNotConfigured,
            Self::UnsupportedCommand(..) | Self::UnsupportedWord(_) => {
                StatusCode::UnsupportedCommand
            }
            Self::ModalGroupViolation(_) => StatusCode::ModalGroupViolation,
            Self::RepeatedWord(_) => StatusCode::RepeatedWord,
        }
    }
}

/// Line parser collaborator used by the dispatcher.
pub trait LineParser {
    /// Decode one line. On failure the error message is retained until
    /// [`LineParser::clear_error`].
    fn parse_line(&mut self, line: &[u8]) -> Result<ParsedMove, ParseError>;

    /// Message of the last failure, if not cleared.
    fn last_error_message(&self) -> Option<&str>;

    /// Forget the last failure.
    fn clear_error(&mut self);
}

/// Word parser for the supported G-code subset.
#[derive(Debug)]
pub struct GcodeParser {
    axis_count: usize,
    last_error: Option<String<ERROR_MESSAGE_CAPACITY>>,
}

impl GcodeParser {
    /// Parser accepting axis words for the first `axis_count` axes.
    pub fn new(axis_count: usize) -> Self {
        Self {
            axis_count: axis_count.min(MAX_AXES),
            last_error: None,
        }
    }

    fn record(&mut self, err: ParseError) -> ParseError {
        let mut msg = String::new();
        // Truncation on overflow is acceptable for a diagnostic string.
        let _ = write!(msg, "{err}");
        if msg.is_empty() {
            let _ = msg.push_str(err.code().message());
        }
        self.last_error = Some(msg);
        err
    }

    fn decode(&self, line: &[u8]) -> Result<ParsedMove, ParseError> {
        let clean = normalize(line)?;
        let mut mv = ParsedMove::default();
        let mut pos = 0;

        while pos < clean.len() {
            let letter = clean[pos];
            if !letter.is_ascii_uppercase() {
                return Err(ParseError::ExpectedCommandLetter(letter as char));
            }
            pos += 1;

            let start = pos;
            while pos < clean.len() && matches!(clean[pos], b'0'..=b'9' | b'.' | b'-' | b'+') {
                pos += 1;
            }
            let value = parse_number(letter, &clean[start..pos])?;
            self.apply_word(&mut mv, letter, value)?;
        }
        Ok(mv)
    }

    fn apply_word(&self, mv: &mut ParsedMove, letter: u8, value: f64) -> Result<(), ParseError> {
        let ch = letter as char;
        match letter {
            b'G' => apply_g_word(mv, value),
            b'F' => {
                if mv.feed_rate.is_some() {
                    return Err(ParseError::RepeatedWord(ch));
                }
                if value < 0.0 {
                    return Err(ParseError::NegativeValue(ch));
                }
                mv.feed_rate = Some(value);
                Ok(())
            }
            b'N' => {
                if mv.line_number.is_some() {
                    return Err(ParseError::RepeatedWord(ch));
                }
                if value < 0.0 {
                    return Err(ParseError::NegativeValue(ch));
                }
                if value.fract() != 0.0 || value > u32::MAX as f64 {
                    return Err(ParseError::BadNumberFormat(ch));
                }
                mv.line_number = Some(value as u32);
                Ok(())
            }
            _ => match Axis::from_letter(letter) {
                Some(axis) if axis.index() < self.axis_count => {
                    if mv.words.set(axis, value) {
                        Ok(())
                    } else {
                        Err(ParseError::RepeatedWord(ch))
                    }
                }
                Some(_) => Err(ParseError::AxisNotConfigured(ch)),
                None => Err(ParseError::UnsupportedWord(ch)),
            },
        }
    }
}

impl LineParser for GcodeParser {
    fn parse_line(&mut self, line: &[u8]) -> Result<ParsedMove, ParseError> {
        self.decode(line).map_err(|e| self.record(e))
    }

    fn last_error_message(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn clear_error(&mut self) {
        self.last_error = None;
    }
}

/// Strip whitespace and comments, upper-case letters.
fn normalize(line: &[u8]) -> Result<Vec<u8, LINE_BUFFER_CAPACITY>, ParseError> {
    let mut out = Vec::new();
    let mut in_comment = false;
    for &b in line {
        if in_comment {
            if b == b')' {
                in_comment = false;
            }
            continue;
        }
        match b {
            b'(' => in_comment = true,
            b';' => break,
            b if b.is_ascii_whitespace() => {}
            b if !b.is_ascii() || b.is_ascii_control() => {
                return Err(ParseError::InvalidStatement);
            }
            b => {
                out.push(b.to_ascii_uppercase())
                    .map_err(|_| ParseError::InvalidStatement)?;
            }
        }
    }
    if in_comment {
        return Err(ParseError::InvalidStatement);
    }
    Ok(out)
}

fn parse_number(letter: u8, digits: &[u8]) -> Result<f64, ParseError> {
    let bad = || ParseError::BadNumberFormat(letter as char);
    if digits.is_empty() || digits.len() > NUMBER_CAPACITY {
        return Err(bad());
    }
    let text = core::str::from_utf8(digits).map_err(|_| bad())?;
    let value: f64 = text.parse().map_err(|_| bad())?;
    if value.is_finite() { Ok(value) } else { Err(bad()) }
}

fn apply_g_word(mv: &mut ParsedMove, value: f64) -> Result<(), ParseError> {
    if value < 0.0 {
        return Err(ParseError::NegativeValue('G'));
    }
    // Fractional command numbers are malformed, never truncated.
    if value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(ParseError::BadNumberFormat('G'));
    }
    let code = value as u32;
    let clash = ParseError::ModalGroupViolation(code);
    match code {
        0 | 1 => {
            if mv.motion.is_some() {
                return Err(clash);
            }
            mv.motion = Some(if code == 0 { MotionMode::Rapid } else { MotionMode::Linear });
        }
        17 | 18 | 19 => {
            if mv.plane.is_some() {
                return Err(clash);
            }
            mv.plane = Some(match code {
                17 => Plane::XY,
                18 => Plane::ZX,
                _ => Plane::YZ,
            });
        }
        20 | 21 => {
            if mv.units.is_some() {
                return Err(clash);
            }
            mv.units = Some(if code == 20 { Units::Inches } else { Units::Millimeters });
        }
        90 | 91 => {
            if mv.distance.is_some() {
                return Err(clash);
            }
            mv.distance = Some(if code == 90 {
                DistanceMode::Absolute
            } else {
                DistanceMode::Incremental
            });
        }
        _ => return Err(ParseError::UnsupportedCommand('G', code)),
    }
    Ok(())
}
