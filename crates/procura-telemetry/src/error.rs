//! Telemetry error types.

use thiserror::Error;

/// Errors raised while setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A level, directive or target could not be used.
    #[error("logging configuration error: {0}")]
    ConfigError(String),

    /// A global subscriber was already installed, or install failed.
    #[error("logging initialization error: {0}")]
    InitError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
