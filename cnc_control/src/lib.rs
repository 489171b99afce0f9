//! # CNC Control
//!
//! Streaming control front-end for a small CNC machine. A sender streams
//! G-code lines over a serial link and paces itself on the `ok` / `error:`
//! answers; the controller reads, parses, admits and executes them without
//! ever blocking its main loop.
//!
//! ## Data Path
//!
//! 1. [`line_reader`]: bytes → lines, realtime bytes intercepted up front
//! 2. [`parser`]: line → [`cnc_common::gcode::ParsedMove`]
//! 3. [`queue`] + [`planner`]: all-or-nothing admission into a bounded queue
//! 4. [`executor`]: handoff to the trajectory tick and pulse edge handlers
//!
//! [`dispatcher`] sequences these once per super-loop iteration and owns the
//! flow-control protocol. [`runner`] hosts the loop and the tick source.
//!
//! ## Zero-Allocation Hot Path
//!
//! Line, queue and response buffers are fixed-capacity `heapless`
//! containers. The interrupt-side handlers touch only atomics.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod line_reader;
pub mod parser;
pub mod planner;
pub mod queue;
pub mod rt;
pub mod runner;
pub mod serial;
