//! Axis identifiers, axis masks and per-axis value containers.
//!
//! All per-axis arrays are indexed by [`Axis::index`] and sized by
//! [`MAX_AXES`], so they can live in fixed-size storage shared with
//! interrupt context.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::consts::MAX_AXES;

/// Signed per-axis step counts.
pub type StepVector = [i32; MAX_AXES];

/// Machine axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
    A = 3,
}

impl Axis {
    /// All axes in index order.
    pub const ALL: [Axis; MAX_AXES] = [Axis::X, Axis::Y, Axis::Z, Axis::A];

    /// Array index of this axis.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Convert from an array index. Returns `None` when out of range.
    #[inline]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::X),
            1 => Some(Self::Y),
            2 => Some(Self::Z),
            3 => Some(Self::A),
            _ => None,
        }
    }

    /// Map an upper-case G-code word letter to its axis.
    #[inline]
    pub const fn from_letter(letter: u8) -> Option<Self> {
        match letter {
            b'X' => Some(Self::X),
            b'Y' => Some(Self::Y),
            b'Z' => Some(Self::Z),
            b'A' => Some(Self::A),
            _ => None,
        }
    }

    /// G-code word letter of this axis.
    #[inline]
    pub const fn letter(self) -> char {
        match self {
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
            Self::A => 'A',
        }
    }

    /// Single-bit mask for this axis.
    #[inline]
    pub const fn mask(self) -> AxisMask {
        AxisMask::from_bits_truncate(1 << self as u8)
    }
}

bitflags! {
    /// Set of axes (word presence, armed pulses, negative direction).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AxisMask: u8 {
        const X = 0x01;
        const Y = 0x02;
        const Z = 0x04;
        const A = 0x08;
    }
}

impl AxisMask {
    /// Whether `axis` is a member of the set.
    #[inline]
    pub const fn has(&self, axis: Axis) -> bool {
        self.contains(axis.mask())
    }

    /// Iterate member axes in index order.
    pub fn axes(self) -> impl Iterator<Item = Axis> {
        Axis::ALL.into_iter().filter(move |a| self.has(*a))
    }
}

/// Axis words of one command: presence plus value per axis.
///
/// Values are in the command's own units and distance mode; the planner
/// resolves them against modal state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisWords {
    present: AxisMask,
    values: [f64; MAX_AXES],
}

impl AxisWords {
    /// Empty word set.
    pub const fn new() -> Self {
        Self {
            present: AxisMask::empty(),
            values: [0.0; MAX_AXES],
        }
    }

    /// Record a word. Returns `false` if the axis word was already present.
    pub fn set(&mut self, axis: Axis, value: f64) -> bool {
        if self.present.has(axis) {
            return false;
        }
        self.present |= axis.mask();
        self.values[axis.index()] = value;
        true
    }

    /// Value of the word for `axis`, if present.
    #[inline]
    pub fn get(&self, axis: Axis) -> Option<f64> {
        self.present.has(axis).then_some(self.values[axis.index()])
    }

    /// Axes carrying a word.
    #[inline]
    pub const fn present(&self) -> AxisMask {
        self.present
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.present.is_empty()
    }
}
