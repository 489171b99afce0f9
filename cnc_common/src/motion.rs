//! Fully planned motion blocks.
//!
//! A [`MotionBlock`] is immutable once built: per-axis signed step counts and
//! a nominal duration in trajectory ticks. The executor consumes it without
//! any further computation.

use crate::axis::{Axis, AxisMask, StepVector};
use crate::consts::MAX_AXES;

/// One ready-to-execute coordinated move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionBlock {
    steps: StepVector,
    step_event_count: u32,
    duration_ticks: u32,
    line_number: Option<u32>,
}

impl MotionBlock {
    /// Build a block. Returns `None` for a zero-length move.
    ///
    /// `duration_ticks` is clamped to at least one tick.
    pub fn new(steps: StepVector, duration_ticks: u32, line_number: Option<u32>) -> Option<Self> {
        let step_event_count = steps.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        if step_event_count == 0 {
            return None;
        }
        Some(Self {
            steps,
            step_event_count,
            duration_ticks: duration_ticks.max(1),
            line_number,
        })
    }

    /// Signed step count per axis.
    #[inline]
    pub const fn steps(&self) -> &StepVector {
        &self.steps
    }

    /// Signed step count of one axis.
    #[inline]
    pub const fn axis_steps(&self, axis: Axis) -> i32 {
        self.steps[axis.index()]
    }

    /// Largest absolute per-axis step count.
    #[inline]
    pub const fn step_event_count(&self) -> u32 {
        self.step_event_count
    }

    /// Nominal duration in trajectory ticks (>= 1).
    #[inline]
    pub const fn duration_ticks(&self) -> u32 {
        self.duration_ticks
    }

    /// Source line number, if the line carried one.
    #[inline]
    pub const fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    /// Axes travelling in the negative direction.
    pub fn negative_axes(&self) -> AxisMask {
        let mut mask = AxisMask::empty();
        for i in 0..MAX_AXES {
            if self.steps[i] < 0 {
                if let Some(axis) = Axis::from_index(i) {
                    mask |= axis.mask();
                }
            }
        }
        mask
    }
}
