//! Pipeline error types.
//!
//! Lower-layer errors are folded into the public taxonomy here. Audit write
//! failures are the exception: they never convert implicitly, because the
//! cause must be logged and replaced with a generic message (see
//! [`PipelineError::audit_write_failed`]).

use procura_access::AccessError;
use procura_audit::AuditError;
use procura_core::{CoreError, RecordRef};
use procura_grants::GrantError;
use procura_records::RecordError;
use procura_storage::StorageError;
use thiserror::Error;
use tracing::error;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The actor lacks the required privilege. Absent records produce the
    /// same error for non-privileged actors.
    #[error("access denied: {reason}")]
    Denied {
        /// Human-readable reason.
        reason: String,
    },

    /// A create referenced a parent or link that does not exist. Nothing
    /// was persisted.
    #[error("parent record not found: {0}")]
    ParentMissing(RecordRef),

    /// A grant named both or neither of an actor and a group.
    #[error("invalid grant shape: {0}")]
    InvalidGrantShape(String),

    /// The audit entry could not be written and the whole transaction was
    /// rolled back.
    #[error("audit write failed; the change was not applied")]
    AuditWriteFailed,

    /// The target does not exist (reported to privileged actors only).
    #[error("not found: {0}")]
    NotFound(String),

    /// Other records still point at the target.
    #[error("{record} is referenced by {count} other record(s)")]
    HasDependents {
        /// Record that could not be deleted.
        record: RecordRef,
        /// Number of referencing records.
        count: usize,
    },

    /// The record input is not acceptable.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A grant, group, membership or actor request is not acceptable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A concurrent transaction changed data this one depended on. Nothing
    /// was written; the caller may resubmit.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Reading the audit log failed.
    #[error("audit log error: {0}")]
    AuditLog(#[source] AuditError),

    /// The underlying store failed.
    #[error(transparent)]
    Storage(StorageError),
}

impl PipelineError {
    /// Log an audit failure with its cause and return the generic error.
    pub(crate) fn audit_write_failed(cause: &AuditError) -> Self {
        error!(error = %cause, "Audit write failed, rolling back");
        Self::AuditWriteFailed
    }

    /// Whether this is an authorization failure.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

impl From<StorageError> for PipelineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict { namespace, key } => Self::Conflict(format!("{namespace}/{key}")),
            other => Self::Storage(other),
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(e: CoreError) -> Self {
        Self::InvalidRecord(e.to_string())
    }
}

impl From<RecordError> for PipelineError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::NotFound(r) => Self::NotFound(r.to_string()),
            RecordError::ParentMissing(r) => Self::ParentMissing(r),
            e @ (RecordError::ParentNotDeclared { .. }
            | RecordError::InvalidLink { .. }
            | RecordError::NoOwnerGroup(_)) => Self::InvalidRecord(e.to_string()),
            RecordError::Corrupt(msg) => Self::Storage(StorageError::Serialization(msg)),
            RecordError::Storage(e) => e.into(),
        }
    }
}

impl From<GrantError> for PipelineError {
    fn from(e: GrantError) -> Self {
        match e {
            GrantError::InvalidShape(msg) => Self::InvalidGrantShape(msg.to_string()),
            e @ (GrantError::NotFound(_)
            | GrantError::GroupNotFound(_)
            | GrantError::ActorNotFound(_)) => Self::NotFound(e.to_string()),
            e @ (GrantError::ViewerLevel { .. }
            | GrantError::DuplicateGroup(_)
            | GrantError::DuplicateActor(_)
            | GrantError::GroupNotEmpty { .. }
            | GrantError::AlreadyMember { .. }
            | GrantError::NotMember { .. }) => Self::InvalidRequest(e.to_string()),
            GrantError::Corrupt(msg) => Self::Storage(StorageError::Serialization(msg)),
            GrantError::Storage(e) => e.into(),
        }
    }
}

impl From<AccessError> for PipelineError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Record(e) => e.into(),
            AccessError::Grant(e) => e.into(),
            AccessError::Storage(e) => e.into(),
        }
    }
}

/// Result type for engine operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
