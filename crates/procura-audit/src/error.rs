//! Audit-related error types.

use procura_crypto::CryptoError;
use procura_storage::StorageError;
use thiserror::Error;

/// Errors that can occur with audit recording and verification.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The action does not match the states supplied with it.
    #[error("{action} entry has an invalid state pair: {reason}")]
    InvalidStates {
        /// The action being recorded.
        action: String,
        /// What was wrong.
        reason: &'static str,
    },

    /// Entry not found.
    #[error("audit entry not found: {entry_id}")]
    EntryNotFound {
        /// The entry ID that was not found.
        entry_id: String,
    },

    /// Chain integrity violation.
    #[error("chain integrity violation at entry {entry_id}: {reason}")]
    IntegrityViolation {
        /// The entry where violation was detected.
        entry_id: String,
        /// Why the chain is invalid.
        reason: String,
    },

    /// Invalid signature on entry.
    #[error("invalid signature on entry {entry_id}")]
    InvalidSignature {
        /// The entry with invalid signature.
        entry_id: String,
    },

    /// The sink refused the write.
    #[error("audit sink rejected entry: {0}")]
    SinkRejected(String),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
