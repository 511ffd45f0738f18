//! Access resolution error types.

use procura_grants::GrantError;
use procura_records::RecordError;
use procura_storage::StorageError;
use thiserror::Error;

/// Failures while evaluating a decision. A denial is not an error; it is a
/// [`Decision::Deny`](crate::Decision::Deny).
#[derive(Debug, Error)]
pub enum AccessError {
    /// A record lookup failed.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// A grant or membership lookup failed.
    #[error(transparent)]
    Grant(#[from] GrantError),

    /// The store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for access resolution.
pub type AccessResult<T> = Result<T, AccessError>;
