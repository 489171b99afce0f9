//! Parsed command representation.
//!
//! A [`ParsedMove`] is what the line parser hands to the dispatcher: zero or
//! more axis words plus any modal words found on the line. It is consumed
//! once; the dispatcher classifies it as motion (axis words present) or
//! modal (no axis words).

use serde::{Deserialize, Serialize};

use crate::axis::AxisWords;

/// Motion modal group (G0/G1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum MotionMode {
    /// G0: traverse at the axes' maximum rate.
    Rapid = 0,
    /// G1: feed at the active feed rate.
    #[default]
    Linear = 1,
}

/// Distance modal group (G90/G91).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum DistanceMode {
    #[default]
    Absolute = 0,
    Incremental = 1,
}

/// Units modal group (G20/G21).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Units {
    Inches = 0,
    #[default]
    Millimeters = 1,
}

/// Plane selection modal group (G17/G18/G19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Plane {
    #[default]
    XY = 0,
    ZX = 1,
    YZ = 2,
}

/// One decoded command line.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParsedMove {
    /// Axis words on the line.
    pub words: AxisWords,
    /// Motion mode word, if any.
    pub motion: Option<MotionMode>,
    /// Distance mode word, if any.
    pub distance: Option<DistanceMode>,
    /// Units word, if any.
    pub units: Option<Units>,
    /// Plane word, if any.
    pub plane: Option<Plane>,
    /// Feed rate word in the line's units per minute.
    pub feed_rate: Option<f64>,
    /// `N` line number, if any.
    pub line_number: Option<u32>,
}

impl ParsedMove {
    /// Whether this command produces axis motion.
    #[inline]
    pub fn has_axis_words(&self) -> bool {
        !self.words.is_empty()
    }
}
