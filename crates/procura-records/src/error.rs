//! Record and inheritance error types.

use procura_core::{CoreError, EntityType, RecordRef};
use procura_storage::StorageError;
use thiserror::Error;

/// Errors from record storage and owner-group inheritance.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record does not exist.
    #[error("record not found: {0}")]
    NotFound(RecordRef),

    /// A referenced parent record does not exist.
    #[error("parent record not found: {0}")]
    ParentMissing(RecordRef),

    /// A child record was submitted without a parent reference.
    #[error("{child} requires a parent {parent}")]
    ParentNotDeclared {
        /// The child type being created.
        child: EntityType,
        /// The parent type it must reference.
        parent: EntityType,
    },

    /// A record type may not reference the given type.
    #[error("{entity_type} cannot reference {target}")]
    InvalidLink {
        /// Type of the referencing record.
        entity_type: EntityType,
        /// Type it tried to reference.
        target: EntityType,
    },

    /// A parent in the ownership chain has no owner group.
    #[error("record {0} has no owner group")]
    NoOwnerGroup(RecordRef),

    /// A stored record could not be decoded.
    #[error("corrupt record state: {0}")]
    Corrupt(String),

    /// The underlying store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CoreError> for RecordError {
    fn from(e: CoreError) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;
