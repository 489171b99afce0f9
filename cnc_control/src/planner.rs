//! Constant-velocity planner.
//!
//! Resolves parsed moves against modal state (units, distance mode, feed
//! rate, motion mode) into [`MotionBlock`]s. Planning is a pure function of
//! the current [`PlannerState`]; the caller commits the returned state only
//! when the block was actually admitted, so a rejected line leaves no trace.
//!
//! Velocity profiling is out of scope: a block carries its nominal duration
//! and the trajectory tick distributes steps uniformly over it.

use cnc_common::axis::{Axis, StepVector};
use cnc_common::consts::{MAX_AXES, MM_PER_INCH};
use cnc_common::gcode::{DistanceMode, MotionMode, ParsedMove, Plane, Units};
use cnc_common::motion::MotionBlock;
use cnc_common::protocol::StatusCode;
use thiserror::Error;

use crate::config::{AxisSettings, ControllerConfig};

/// Move that cannot be planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Target or per-block step count does not fit the step counters.
    #[error("Target out of range on axis {0}")]
    TargetOutOfRange(char),
}

impl PlanError {
    /// Wire status code for this error.
    pub const fn code(&self) -> StatusCode {
        match self {
            Self::TargetOutOfRange(_) => StatusCode::InvalidTarget,
        }
    }
}

/// Modal state owned by the planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerState {
    /// Planned position [steps], end point of the last admitted block.
    pub position: StepVector,
    pub motion: MotionMode,
    pub distance: DistanceMode,
    pub units: Units,
    pub plane: Plane,
    /// Active feed rate [mm/min].
    pub feed_rate: f64,
}

/// Outcome of planning one move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plan {
    /// State to commit if the move is admitted.
    pub next: PlannerState,
    /// Block to enqueue; `None` for a zero-length move.
    pub block: Option<MotionBlock>,
}

/// Converts parsed moves into step blocks.
#[derive(Debug, Clone)]
pub struct Planner {
    axes: AxisSettings,
    tick_rate_hz: u32,
    default_feed_rate: f64,
    state: PlannerState,
}

impl Planner {
    pub fn new(axes: AxisSettings, tick_rate_hz: u32, default_feed_rate: f64) -> Self {
        Self {
            axes,
            tick_rate_hz,
            default_feed_rate,
            state: Self::initial_state(default_feed_rate),
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.axis_settings(),
            config.timing.tick_rate_hz,
            config.motion.default_feed_rate,
        )
    }

    fn initial_state(feed_rate: f64) -> PlannerState {
        PlannerState {
            position: [0; MAX_AXES],
            motion: MotionMode::default(),
            distance: DistanceMode::default(),
            units: Units::default(),
            plane: Plane::default(),
            feed_rate,
        }
    }

    #[inline]
    pub fn state(&self) -> &PlannerState {
        &self.state
    }

    /// Commit a state produced by [`Planner::plan`] or [`Planner::plan_modal`].
    #[inline]
    pub fn commit(&mut self, next: PlannerState) {
        self.state = next;
    }

    /// Restore power-on modal state at `machine_position`.
    pub fn resync(&mut self, machine_position: &StepVector) {
        self.state = Self::initial_state(self.default_feed_rate);
        self.state.position = *machine_position;
    }

    /// Apply the modal words of `mv` to a copy of the current state.
    pub fn plan_modal(&self, mv: &ParsedMove) -> PlannerState {
        let mut next = self.state;
        if let Some(units) = mv.units {
            next.units = units;
        }
        if let Some(distance) = mv.distance {
            next.distance = distance;
        }
        if let Some(plane) = mv.plane {
            next.plane = plane;
        }
        if let Some(motion) = mv.motion {
            next.motion = motion;
        }
        if let Some(feed) = mv.feed_rate {
            if feed > 0.0 {
                next.feed_rate = to_mm(feed, next.units);
            }
        }
        next
    }

    /// Plan `mv` without touching the current state.
    ///
    /// Targets and deltas are computed in i64; a move whose target or step
    /// delta leaves the i32 step range is refused, never clamped.
    pub fn plan(&self, mv: &ParsedMove) -> Result<Plan, PlanError> {
        let mut next = self.plan_modal(mv);

        let mut target = next.position;
        for axis in mv.words.present().axes() {
            let i = axis.index();
            if i >= self.axes.axis_count {
                continue;
            }
            let Some(value) = mv.words.get(axis) else {
                continue;
            };
            let out_of_range = PlanError::TargetOutOfRange(axis.letter());
            let steps = (to_mm(value, next.units) * self.axes.steps_per_mm[i]).round();
            if !steps.is_finite() || steps.abs() > i64::from(i32::MAX) as f64 {
                return Err(out_of_range);
            }
            let steps = steps as i64;
            let wanted = match next.distance {
                DistanceMode::Absolute => steps,
                DistanceMode::Incremental => i64::from(next.position[i]) + steps,
            };
            target[i] = i32::try_from(wanted).map_err(|_| out_of_range)?;
        }

        let mut delta = [0i32; MAX_AXES];
        for (i, axis) in Axis::ALL.iter().enumerate() {
            let d = i64::from(target[i]) - i64::from(next.position[i]);
            delta[i] =
                i32::try_from(d).map_err(|_| PlanError::TargetOutOfRange(axis.letter()))?;
        }

        let ticks = self.duration_ticks(&delta, &next);
        next.position = target;
        Ok(Plan {
            next,
            block: MotionBlock::new(delta, ticks, mv.line_number),
        })
    }

    /// Nominal duration of a move: feed-limited for G1, and never faster
    /// than the slowest axis allows.
    fn duration_ticks(&self, delta: &StepVector, state: &PlannerState) -> u32 {
        let ticks_per_min = 60.0 * self.tick_rate_hz as f64;
        let mut length_sq = 0.0;
        let mut axis_limited: f64 = 0.0;
        for axis in Axis::ALL.iter().take(self.axes.axis_count) {
            let i = axis.index();
            if delta[i] == 0 {
                continue;
            }
            let mm = delta[i] as f64 / self.axes.steps_per_mm[i];
            length_sq += mm * mm;
            axis_limited = axis_limited.max(mm.abs() * ticks_per_min / self.axes.max_rate[i]);
        }

        let ticks = match state.motion {
            MotionMode::Rapid => axis_limited,
            MotionMode::Linear => {
                (length_sq.sqrt() * ticks_per_min / state.feed_rate).max(axis_limited)
            }
        };
        // Tolerate float noise so an exact tick count does not round up.
        (ticks - 1e-6).ceil().clamp(1.0, u32::MAX as f64) as u32
    }
}

#[inline]
fn to_mm(value: f64, units: Units) -> f64 {
    match units {
        Units::Millimeters => value,
        Units::Inches => value * MM_PER_INCH,
    }
}
