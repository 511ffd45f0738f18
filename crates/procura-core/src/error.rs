//! Core error types.

use thiserror::Error;

/// Errors raised while parsing or validating core values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An entity type name did not match any known record type.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// A role name did not match the role hierarchy.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// An access level name did not match Read, Write or Full.
    #[error("unknown access level: {0}")]
    UnknownAccessLevel(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A record could not be converted to or from its JSON state.
    #[error("invalid record state: {0}")]
    InvalidState(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
