//! CNC Common Library
//!
//! Shared constants, axis and motion types, the streaming protocol vocabulary
//! and configuration loading utilities for all CNC workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - System-wide numeric limits
//! - [`axis`] - Axis identifiers, axis masks and step vectors
//! - [`gcode`] - Parsed command representation (axis words + modal words)
//! - [`motion`] - Fully planned motion blocks
//! - [`protocol`] - Realtime bytes, status codes and line responses
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use cnc_common::prelude::*;
//! ```

pub mod axis;
pub mod config;
pub mod consts;
pub mod gcode;
pub mod motion;
pub mod prelude;
pub mod protocol;
