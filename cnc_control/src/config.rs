//! TOML configuration loader with validation.
//!
//! Loads [`ControllerConfig`] through the shared `ConfigLoader` trait and
//! validates parameter bounds, axis ordering and axis uniqueness.

use std::collections::HashSet;
use std::path::Path;

use cnc_common::axis::Axis;
use cnc_common::config::{ConfigError, ConfigLoader, SharedConfig};
use cnc_common::consts::{
    DEFAULT_FEED_RATE, HOLD_DECEL_DEFAULT, MAX_AXES, MOTION_QUEUE_DEFAULT, MOTION_QUEUE_MAX,
    RATE_NOMINAL, RESUME_ACCEL_DEFAULT, TICK_RATE_HZ_DEFAULT, TICK_RATE_HZ_MAX,
    TICK_RATE_HZ_MIN,
};
use serde::{Deserialize, Serialize};

// ─── Config Sections ────────────────────────────────────────────────

/// Top-level controller configuration.
///
/// Loaded from TOML at startup, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    pub shared: SharedConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub motion: MotionConfig,

    /// Axes in index order, starting at X.
    pub axes: Vec<AxisConfig>,
}

/// Streaming / flow-control parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    /// Motion queue capacity [blocks] (1..=MOTION_QUEUE_MAX, default: 16).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Trajectory tick parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    /// Trajectory tick rate [Hz] (default: 1000).
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,

    /// Speed removed per tick during feed hold [per-mille of nominal].
    #[serde(default = "default_hold_decel")]
    pub hold_decel_per_tick: u32,

    /// Speed added per tick when resuming [per-mille of nominal].
    #[serde(default = "default_resume_accel")]
    pub resume_accel_per_tick: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
            hold_decel_per_tick: default_hold_decel(),
            resume_accel_per_tick: default_resume_accel(),
        }
    }
}

/// Planner defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotionConfig {
    /// Feed rate used by G1 until the program sets `F` [mm/min].
    #[serde(default = "default_feed_rate")]
    pub default_feed_rate: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            default_feed_rate: default_feed_rate(),
        }
    }
}

/// Per-axis mechanics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisConfig {
    pub axis: Axis,
    /// Steps per millimetre.
    pub steps_per_mm: f64,
    /// Maximum rate [mm/min], also the G0 rate.
    pub max_rate: f64,
}

fn default_queue_capacity() -> usize {
    MOTION_QUEUE_DEFAULT
}
fn default_tick_rate() -> u32 {
    TICK_RATE_HZ_DEFAULT
}
fn default_hold_decel() -> u32 {
    HOLD_DECEL_DEFAULT
}
fn default_resume_accel() -> u32 {
    RESUME_ACCEL_DEFAULT
}
fn default_feed_rate() -> f64 {
    DEFAULT_FEED_RATE
}

// ─── Derived Axis Settings ──────────────────────────────────────────

/// Fixed-size per-axis mechanics, copied into the planner and the
/// status reporter so neither keeps the `Vec` from the config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSettings {
    pub axis_count: usize,
    pub steps_per_mm: [f64; MAX_AXES],
    pub max_rate: [f64; MAX_AXES],
}

impl AxisSettings {
    /// Convert a step position to millimetres.
    pub fn steps_to_mm(&self, steps: &[i32; MAX_AXES]) -> [f64; MAX_AXES] {
        let mut mm = [0.0; MAX_AXES];
        for i in 0..self.axis_count {
            mm[i] = steps[i] as f64 / self.steps_per_mm[i];
        }
        mm
    }
}

impl ControllerConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let cap = self.stream.queue_capacity;
        if cap == 0 || cap > MOTION_QUEUE_MAX {
            return Err(ConfigError::ValidationError(format!(
                "queue_capacity {cap} out of range [1, {MOTION_QUEUE_MAX}]"
            )));
        }

        let rate = self.timing.tick_rate_hz;
        if !(TICK_RATE_HZ_MIN..=TICK_RATE_HZ_MAX).contains(&rate) {
            return Err(ConfigError::ValidationError(format!(
                "tick_rate_hz {rate} out of range [{TICK_RATE_HZ_MIN}, {TICK_RATE_HZ_MAX}]"
            )));
        }
        for (name, v) in [
            ("hold_decel_per_tick", self.timing.hold_decel_per_tick),
            ("resume_accel_per_tick", self.timing.resume_accel_per_tick),
        ] {
            if v == 0 || v > RATE_NOMINAL {
                return Err(ConfigError::ValidationError(format!(
                    "{name} {v} out of range [1, {RATE_NOMINAL}]"
                )));
            }
        }

        if !(self.motion.default_feed_rate > 0.0) {
            return Err(ConfigError::ValidationError(
                "default_feed_rate must be > 0".to_string(),
            ));
        }

        validate_axes(&self.axes)
    }

    /// Fixed-size copy of the axis mechanics.
    pub fn axis_settings(&self) -> AxisSettings {
        let mut settings = AxisSettings {
            axis_count: self.axes.len().min(MAX_AXES),
            steps_per_mm: [1.0; MAX_AXES],
            max_rate: [0.0; MAX_AXES],
        };
        for ax in self.axes.iter().take(MAX_AXES) {
            let i = ax.axis.index();
            settings.steps_per_mm[i] = ax.steps_per_mm;
            settings.max_rate[i] = ax.max_rate;
        }
        settings
    }
}

/// Axes must be non-empty, unique, contiguous from X and physically sane.
fn validate_axes(axes: &[AxisConfig]) -> Result<(), ConfigError> {
    if axes.is_empty() || axes.len() > MAX_AXES {
        return Err(ConfigError::ValidationError(format!(
            "axis count {} out of range [1, {MAX_AXES}]",
            axes.len()
        )));
    }

    let mut seen = HashSet::new();
    for (i, ax) in axes.iter().enumerate() {
        if !seen.insert(ax.axis) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate axis {}",
                ax.axis.letter()
            )));
        }
        if ax.axis.index() != i {
            return Err(ConfigError::ValidationError(format!(
                "axis {} listed at position {i}; axes must be ordered X, Y, Z, A",
                ax.axis.letter()
            )));
        }
        if !(ax.steps_per_mm > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "axis {}: steps_per_mm must be > 0",
                ax.axis.letter()
            )));
        }
        if !(ax.max_rate > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "axis {}: max_rate must be > 0",
                ax.axis.letter()
            )));
        }
    }
    Ok(())
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate the controller configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ControllerConfig, ConfigError> {
    let config = ControllerConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML string (for testing and embedded defaults).
pub fn load_config_from_str(toml: &str) -> Result<ControllerConfig, ConfigError> {
    let config = ControllerConfig::parse(toml)?;
    config.validate()?;
    Ok(config)
}

// ─── Tests ──────────────────────────────────────────────────────────
