//! System-wide constants for the CNC workspace.
//!
//! Single source of truth for all numeric limits and default paths.
//! Imported by all crates.

use static_assertions::const_assert;

/// Maximum number of axes (X, Y, Z, A).
pub const MAX_AXES: usize = 4;

/// Command line buffer size in bytes, terminator slot included.
/// A line holds at most `LINE_BUFFER_CAPACITY - 1` content bytes.
pub const LINE_BUFFER_CAPACITY: usize = 80;

/// Compile-time upper bound of the motion queue.
pub const MOTION_QUEUE_MAX: usize = 32;

/// Default runtime motion queue capacity.
pub const MOTION_QUEUE_DEFAULT: usize = 16;

/// Default trajectory tick rate [Hz] (1 kHz = 1000 µs period).
pub const TICK_RATE_HZ_DEFAULT: u32 = 1000;

/// Lowest accepted trajectory tick rate [Hz].
pub const TICK_RATE_HZ_MIN: u32 = 100;

/// Highest accepted trajectory tick rate [Hz].
pub const TICK_RATE_HZ_MAX: u32 = 50_000;

/// Nominal speed scale of the trajectory profile (per-mille).
pub const RATE_NOMINAL: u32 = 1000;

/// Default feed-hold deceleration [per-mille of nominal per tick].
pub const HOLD_DECEL_DEFAULT: u32 = 50;

/// Default resume acceleration [per-mille of nominal per tick].
pub const RESUME_ACCEL_DEFAULT: u32 = 50;

/// Default feed rate when a program never sets `F` [mm/min].
pub const DEFAULT_FEED_RATE: f64 = 600.0;

/// Millimetres per inch (G20 conversion).
pub const MM_PER_INCH: f64 = 25.4;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/cnc.toml";

const_assert!(MAX_AXES > 0 && MAX_AXES <= 8);
const_assert!(LINE_BUFFER_CAPACITY >= 2);
const_assert!(MOTION_QUEUE_DEFAULT <= MOTION_QUEUE_MAX);
const_assert!(TICK_RATE_HZ_MIN <= TICK_RATE_HZ_DEFAULT && TICK_RATE_HZ_DEFAULT <= TICK_RATE_HZ_MAX);
