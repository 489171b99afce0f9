//! Prelude module for common re-exports.
//!
//! Consumers can do `use cnc_common::prelude::*;` and get the most
//! important types without listing individual paths.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{LINE_BUFFER_CAPACITY, MAX_AXES, MOTION_QUEUE_MAX, TICK_RATE_HZ_DEFAULT};

// ─── Motion ─────────────────────────────────────────────────────────
pub use crate::axis::{Axis, AxisMask, AxisWords, StepVector};
pub use crate::gcode::{DistanceMode, MotionMode, ParsedMove, Plane, Units};
pub use crate::motion::MotionBlock;

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::{MachineStatus, RealtimeCommand, Response, StatusCode, StatusReport};

