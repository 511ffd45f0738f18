//! Write-path audit recording.
//!
//! The recorder is used in two steps around a mutation:
//!
//! 1. [`AuditRecorder::before_mutate`] captures the row as it is before it
//!    is overwritten. It must be called on the state read inside the same
//!    transaction.
//! 2. [`AuditRecorder::after_mutate`] chains, signs and stages the entry in
//!    that transaction. If staging fails the caller rolls back, so no
//!    mutation is ever committed without its entry.

use std::sync::Arc;

use procura_core::{ActorId, ClientInfo};
use procura_crypto::{KeyPair, PublicKey};
use procura_storage::Transaction;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::entry::{AuditAction, AuditEntry, MutationRecord, StreamKey};
use crate::error::{AuditError, AuditResult};
use crate::sink::AuditSink;

/// A row's full state at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Table the row lives in.
    pub table_name: String,
    /// Row identifier.
    pub record_id: u64,
    /// Full JSON state.
    pub state: Value,
}

impl Snapshot {
    /// Capture a row.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if the row cannot be encoded.
    pub fn capture<T: Serialize>(table_name: &str, record_id: u64, row: &T) -> AuditResult<Self> {
        let state =
            serde_json::to_value(row).map_err(|e| AuditError::Serialization(e.to_string()))?;
        Ok(Self {
            table_name: table_name.to_string(),
            record_id,
            state,
        })
    }
}

/// Signs and stages audit entries.
#[derive(Clone)]
pub struct AuditRecorder {
    signer: Arc<KeyPair>,
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    /// Create a recorder writing to `sink`.
    #[must_use]
    pub fn new(signer: Arc<KeyPair>, sink: Arc<dyn AuditSink>) -> Self {
        Self { signer, sink }
    }

    /// The key entries are signed with.
    #[must_use]
    pub fn signer(&self) -> PublicKey {
        self.signer.public_key()
    }

    /// Capture the state of a row about to be updated or deleted.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if the row cannot be encoded.
    pub fn before_mutate<T: Serialize>(
        &self,
        table_name: &str,
        record_id: u64,
        row: &T,
    ) -> AuditResult<Snapshot> {
        Snapshot::capture(table_name, record_id, row)
    }

    /// Record a mutation from its before and after snapshots.
    ///
    /// CREATE takes only `after`, DELETE only `before`, UPDATE both.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidStates`] if the snapshots do not fit the
    /// action or describe different rows, or the sink's error.
    pub async fn after_mutate(
        &self,
        tx: &mut Transaction,
        action: AuditAction,
        before: Option<Snapshot>,
        after: Option<Snapshot>,
        actor_id: ActorId,
        client: &ClientInfo,
    ) -> AuditResult<AuditEntry> {
        let (table_name, record_id) = match (&before, &after) {
            (Some(b), Some(a)) if b.table_name != a.table_name || b.record_id != a.record_id => {
                return Err(AuditError::InvalidStates {
                    action: action.to_string(),
                    reason: "snapshots describe different rows",
                });
            },
            (Some(s), _) | (None, Some(s)) => (s.table_name.clone(), s.record_id),
            (None, None) => {
                return Err(AuditError::InvalidStates {
                    action: action.to_string(),
                    reason: "no snapshot supplied",
                });
            },
        };
        self.record_mutation(
            tx,
            MutationRecord {
                action,
                table_name,
                record_id,
                old_state: before.map(|s| s.state),
                new_state: after.map(|s| s.state),
                actor_id,
                client: client.clone(),
            },
        )
        .await
    }

    /// Record a mutation whose states the caller already holds.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidStates`] if the states do not fit the
    /// action, or the sink's error.
    pub async fn record_mutation(
        &self,
        tx: &mut Transaction,
        mutation: MutationRecord,
    ) -> AuditResult<AuditEntry> {
        let stream = StreamKey::new(&mutation.table_name, mutation.record_id);
        let previous_hash = self.sink.head(tx, &stream).await?;
        let entry = AuditEntry::create(mutation, previous_hash, &self.signer)?;
        self.sink.append(tx, &entry).await?;
        debug!(
            entry_id = %entry.id,
            stream = %stream,
            action = %entry.action,
            actor_id = %entry.actor_id,
            "Staged audit entry"
        );
        Ok(entry)
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("signer", &self.signer.public_key().key_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use procura_storage::{KvStore, MemoryKvStore};
    use serde_json::json;

    use super::*;
    use crate::log::AuditLog;
    use crate::sink::KvAuditSink;

    fn recorder() -> AuditRecorder {
        AuditRecorder::new(Arc::new(KeyPair::generate()), Arc::new(KvAuditSink::new()))
    }

    #[tokio::test]
    async fn test_entries_commit_with_transaction() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let recorder = recorder();
        let client = ClientInfo::from_ip("127.0.0.1");

        let mut tx = Transaction::begin(Arc::clone(&kv));
        let after = Snapshot::capture("asset", 1, &json!({"name": "pump"})).unwrap();
        recorder
            .after_mutate(&mut tx, AuditAction::Create, None, Some(after), ActorId::new(1), &client)
            .await
            .unwrap();
        tx.rollback();

        let log = AuditLog::new(Arc::clone(&kv));
        assert!(log.history("asset", 1).await.unwrap().is_empty());

        let mut tx = Transaction::begin(Arc::clone(&kv));
        let after = Snapshot::capture("asset", 1, &json!({"name": "pump"})).unwrap();
        recorder
            .after_mutate(&mut tx, AuditAction::Create, None, Some(after), ActorId::new(1), &client)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(log.history("asset", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_links_to_previous_entry() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let recorder = recorder();
        let client = ClientInfo::default();
        let actor = ActorId::new(2);

        let mut tx = Transaction::begin(Arc::clone(&kv));
        let v1 = json!({"amount": 1});
        let first = recorder
            .after_mutate(
                &mut tx,
                AuditAction::Create,
                None,
                Some(Snapshot::capture("wbs", 4, &v1).unwrap()),
                actor,
                &client,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = Transaction::begin(Arc::clone(&kv));
        let before = recorder.before_mutate("wbs", 4, &v1).unwrap();
        let second = recorder
            .after_mutate(
                &mut tx,
                AuditAction::Update,
                Some(before),
                Some(Snapshot::capture("wbs", 4, &json!({"amount": 2})).unwrap()),
                actor,
                &client,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(first.previous_hash.is_zero());
        assert!(second.follows(&first));
        assert_eq!(second.old_state, Some(v1));
    }

    #[tokio::test]
    async fn test_mismatched_snapshots_rejected() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let mut tx = Transaction::begin(kv);
        let result = recorder()
            .after_mutate(
                &mut tx,
                AuditAction::Update,
                Some(Snapshot::capture("asset", 1, &json!({})).unwrap()),
                Some(Snapshot::capture("asset", 2, &json!({})).unwrap()),
                ActorId::new(1),
                &ClientInfo::default(),
            )
            .await;
        assert!(matches!(result, Err(AuditError::InvalidStates { .. })));
        assert_eq!(tx.pending_writes(), 0);
    }
}
