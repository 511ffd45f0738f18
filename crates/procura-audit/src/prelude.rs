//! Prelude module - commonly used types for convenient import.
//!
//! Use `use procura_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Entry types
pub use crate::{AuditAction, AuditEntry, AuditEntryId, MutationRecord, StreamKey};

// Recording
pub use crate::{AuditRecorder, AuditSink, KvAuditSink, Snapshot};

// Log and verification
pub use crate::{AuditLog, ChainIssue, ChainVerificationResult};

// Post-processing
pub use crate::{ChangeKind, FieldChange, diff, replay};
