//! Procura Audit - Signed, hash-chained before/after audit trail.
//!
//! This crate provides:
//! - [`AuditEntry`] holding the full JSON state of a row before and after a
//!   mutation
//! - [`AuditRecorder`], which snapshots before a mutation and stages the
//!   signed entry inside the same transaction after it
//! - [`AuditLog`] for history queries and chain verification
//! - [`diff`] and [`replay`] for post-processing stored entries
//!
//! # Security Model
//!
//! Every audit entry is:
//! - Signed by the engine's ed25519 key
//! - Linked to the previous entry of the same row via content hash
//! - Committed atomically with the mutation it describes
//!
//! Modifying a stored entry breaks its signature and the link from its
//! successor; both are reported by [`AuditLog::verify_chain`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use procura_audit::{AuditAction, AuditLog, AuditRecorder, KvAuditSink, Snapshot};
//! use procura_core::{ActorId, ClientInfo};
//! use procura_crypto::KeyPair;
//! use procura_storage::{KvStore, MemoryKvStore, Transaction};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
//! let recorder = AuditRecorder::new(Arc::new(KeyPair::generate()), Arc::new(KvAuditSink::new()));
//!
//! let mut tx = Transaction::begin(Arc::clone(&store));
//! let after = Snapshot::capture("asset", 1, &serde_json::json!({"name": "pump"})).unwrap();
//! recorder
//!     .after_mutate(&mut tx, AuditAction::Create, None, Some(after), ActorId::new(1), &ClientInfo::default())
//!     .await
//!     .unwrap();
//! tx.commit().await.unwrap();
//!
//! let result = AuditLog::new(store).verify_chain("asset", 1).await.unwrap();
//! assert!(result.valid);
//! # });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod diff;
mod entry;
mod error;
mod log;
mod recorder;
mod sink;

pub use diff::{ChangeKind, FieldChange, diff, entry_diff, replay};
pub use entry::{AuditAction, AuditEntry, AuditEntryId, MutationRecord, StreamKey};
pub use error::{AuditError, AuditResult};
pub use log::{AuditLog, ChainIssue, ChainVerificationResult};
pub use recorder::{AuditRecorder, Snapshot};
pub use sink::{AuditSink, KvAuditSink, StreamIndex};
