//! Logging setup for applications embedding the eventing stack.
//!
//! Everything in this workspace logs through `tracing`; this module offers a
//! small initializer so binaries do not have to assemble a subscriber by
//! hand. Libraries should never call this themselves.

use tracing_subscriber::EnvFilter;

/// How much output to produce.
#[derive(Debug, Clone, Copy)]
pub enum LoggingMode {
    /// No subscriber installed; all logs are dropped
    Silent,
    /// Compact stderr output at `info` level, overridable via
    /// `SONOS_GENA_LOG`
    Development,
    /// Verbose stderr output with targets, at `debug` level
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber was already installed
    #[error("failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Install a global tracing subscriber for the chosen mode.
///
/// Call this once, early, before starting the notification server. The
/// `SONOS_GENA_LOG` environment variable overrides the default filter using
/// the usual `tracing_subscriber::EnvFilter` syntax.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    let default_filter = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => "info",
        LoggingMode::Debug => "debug",
    };

    let filter = EnvFilter::try_from_env("SONOS_GENA_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(matches!(mode, LoggingMode::Debug))
        .try_init()
        .map_err(|e| LoggingError::TracingInit(e.to_string()))
}
