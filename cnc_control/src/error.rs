//! Runtime errors of the controller binary and its runner.

use cnc_common::config::ConfigError;
use thiserror::Error;

/// Failure that stops the controller.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("RT setup error: {0}")]
    RtSetup(String),

    #[error("serial link error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("tick source thread panicked")]
    TickThreadPanicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_source() {
        let e = RunError::from(ConfigError::ValidationError("bad axis".into()));
        assert_eq!(
            e.to_string(),
            "config error: Configuration validation failed: bad axis"
        );
        assert_eq!(
            RunError::RtSetup("mlockall failed".into()).to_string(),
            "RT setup error: mlockall failed"
        );
    }
}
