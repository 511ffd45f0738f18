//! Audit log - query and verification interface.

use std::sync::Arc;

use procura_crypto::ContentHash;
use procura_storage::{KvStore, Transaction};
use tracing::{error, warn};

use crate::entry::{AuditEntry, AuditEntryId, StreamKey};
use crate::error::AuditResult;
use crate::sink::{NS_ENTRIES, NS_STREAMS, NS_TIMELINE, StreamIndex};

/// Read access to committed audit entries.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn KvStore>,
}

impl AuditLog {
    /// Open the log over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn reader(&self) -> Transaction {
        Transaction::begin(Arc::clone(&self.store))
    }

    /// Get an entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be read.
    pub async fn entry(&self, id: AuditEntryId) -> AuditResult<Option<AuditEntry>> {
        Ok(self.reader().get_json(NS_ENTRIES, &id.to_string()).await?)
    }

    async fn stream_index(&self, tx: &Transaction, stream: &StreamKey) -> AuditResult<StreamIndex> {
        Ok(tx
            .get_json(NS_STREAMS, &stream.storage_key())
            .await?
            .unwrap_or_default())
    }

    /// Every entry for one row, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be read.
    pub async fn history(&self, table_name: &str, record_id: u64) -> AuditResult<Vec<AuditEntry>> {
        let tx = self.reader();
        let index = self
            .stream_index(&tx, &StreamKey::new(table_name, record_id))
            .await?;
        let mut entries = Vec::with_capacity(index.entries.len());
        for id in index.entries {
            if let Some(entry) = tx.get_json(NS_ENTRIES, &id.to_string()).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// The newest `limit` entries across all rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be read.
    pub async fn recent(&self, limit: usize) -> AuditResult<Vec<AuditEntry>> {
        let tx = self.reader();
        let keys = tx.list_keys(NS_TIMELINE).await?;
        let mut entries = Vec::with_capacity(limit.min(keys.len()));
        for key in keys.iter().rev().take(limit) {
            let Some(id) = tx.get_json::<AuditEntryId>(NS_TIMELINE, key).await? else {
                continue;
            };
            if let Some(entry) = tx.get_json(NS_ENTRIES, &id.to_string()).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Every row that has at least one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub async fn streams(&self) -> AuditResult<Vec<StreamKey>> {
        Ok(self
            .reader()
            .list_keys(NS_STREAMS)
            .await?
            .iter()
            .filter_map(|k| StreamKey::from_storage_key(k))
            .collect())
    }

    /// Count total entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub async fn count(&self) -> AuditResult<usize> {
        Ok(self.reader().list_keys(NS_ENTRIES).await?.len())
    }

    /// Verify the chain of one row's entries.
    ///
    /// Checks that the first entry links to the zero hash, that every entry
    /// links to its predecessor and carries a valid signature, and that each
    /// entry's `old_state` equals its predecessor's `new_state`.
    ///
    /// # Errors
    ///
    /// Returns an error if entries cannot be read.
    pub async fn verify_chain(
        &self,
        table_name: &str,
        record_id: u64,
    ) -> AuditResult<ChainVerificationResult> {
        let tx = self.reader();
        let stream = StreamKey::new(table_name, record_id);
        let index = self.stream_index(&tx, &stream).await?;

        let mut issues = Vec::new();
        let mut entries_verified: usize = 0;
        let mut previous: Option<AuditEntry> = None;

        for id in &index.entries {
            let Some(entry) = tx.get_json::<AuditEntry>(NS_ENTRIES, &id.to_string()).await? else {
                warn!(entry_id = %id, stream = %stream, "Indexed audit entry missing");
                issues.push(ChainIssue::MissingEntry { entry_id: *id });
                continue;
            };

            if let Err(e) = entry.verify_signature() {
                error!(entry_id = %entry.id, error = %e, "Invalid signature");
                issues.push(ChainIssue::InvalidSignature { entry_id: entry.id });
            }

            match &previous {
                None => {
                    if !entry.previous_hash.is_zero() {
                        issues.push(ChainIssue::InvalidGenesis { entry_id: entry.id });
                    }
                    if entry.old_state.is_some() {
                        issues.push(ChainIssue::StateMismatch { entry_id: entry.id });
                    }
                },
                Some(prev) => {
                    if !entry.follows(prev) {
                        warn!(
                            current = %entry.id,
                            previous = %prev.id,
                            "Chain link broken"
                        );
                        issues.push(ChainIssue::BrokenLink {
                            entry_id: entry.id,
                            expected_previous: prev.content_hash(),
                            actual_previous: entry.previous_hash,
                        });
                    }
                    if entry.old_state != prev.new_state {
                        issues.push(ChainIssue::StateMismatch { entry_id: entry.id });
                    }
                },
            }

            entries_verified = entries_verified.saturating_add(1);
            previous = Some(entry);
        }

        if let Some(last) = &previous
            && last.content_hash() != index.head
        {
            issues.push(ChainIssue::HeadMismatch {
                expected: last.content_hash(),
                actual: index.head,
            });
        }

        Ok(ChainVerificationResult {
            valid: issues.is_empty(),
            entries_verified,
            issues,
        })
    }

    /// Verify every stream.
    ///
    /// # Errors
    ///
    /// Returns an error if streams cannot be listed or read.
    pub async fn verify_all(&self) -> AuditResult<Vec<(StreamKey, ChainVerificationResult)>> {
        let mut results = Vec::new();
        for stream in self.streams().await? {
            let result = self
                .verify_chain(&stream.table_name, stream.record_id)
                .await?;
            results.push((stream, result));
        }
        Ok(results)
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

/// Result of chain verification.
#[derive(Debug, Clone)]
pub struct ChainVerificationResult {
    /// Whether the chain is valid.
    pub valid: bool,
    /// Number of entries verified.
    pub entries_verified: usize,
    /// Issues found (empty if valid).
    pub issues: Vec<ChainIssue>,
}

/// An issue found during chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIssue {
    /// First entry doesn't have zero previous hash.
    InvalidGenesis {
        /// The entry with invalid genesis.
        entry_id: AuditEntryId,
    },
    /// Entry has invalid signature.
    InvalidSignature {
        /// The entry with invalid signature.
        entry_id: AuditEntryId,
    },
    /// Chain link is broken.
    BrokenLink {
        /// The entry with broken link.
        entry_id: AuditEntryId,
        /// Expected previous hash.
        expected_previous: ContentHash,
        /// Actual previous hash in entry.
        actual_previous: ContentHash,
    },
    /// Entry's old state differs from its predecessor's new state.
    StateMismatch {
        /// The discontinuous entry.
        entry_id: AuditEntryId,
    },
    /// The stream index names an entry that is not stored.
    MissingEntry {
        /// The missing entry.
        entry_id: AuditEntryId,
    },
    /// The stream head does not match the newest entry.
    HeadMismatch {
        /// Hash of the newest entry.
        expected: ContentHash,
        /// Head recorded in the index.
        actual: ContentHash,
    },
}

impl std::fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGenesis { entry_id } => {
                write!(f, "Invalid genesis at {entry_id}")
            },
            Self::InvalidSignature { entry_id } => {
                write!(f, "Invalid signature at {entry_id}")
            },
            Self::BrokenLink { entry_id, .. } => {
                write!(f, "Broken chain link at {entry_id}")
            },
            Self::StateMismatch { entry_id } => {
                write!(f, "State discontinuity at {entry_id}")
            },
            Self::MissingEntry { entry_id } => {
                write!(f, "Missing entry {entry_id}")
            },
            Self::HeadMismatch { expected, actual } => {
                write!(f, "Stream head {actual} does not match newest entry {expected}")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use procura_core::{ActorId, ClientInfo};
    use procura_crypto::KeyPair;
    use procura_storage::MemoryKvStore;
    use serde_json::{Value, json};

    use super::*;
    use crate::entry::{AuditAction, MutationRecord};
    use crate::recorder::AuditRecorder;
    use crate::sink::KvAuditSink;

    fn mutation(action: AuditAction, old: Option<Value>, new: Option<Value>) -> MutationRecord {
        MutationRecord {
            action,
            table_name: "purchase_order".into(),
            record_id: 1,
            old_state: old,
            new_state: new,
            actor_id: ActorId::new(1),
            client: ClientInfo::default(),
        }
    }

    async fn seed(kv: &Arc<dyn KvStore>) -> Vec<AuditEntry> {
        let recorder =
            AuditRecorder::new(Arc::new(KeyPair::generate()), Arc::new(KvAuditSink::new()));
        let steps = [
            mutation(AuditAction::Create, None, Some(json!({"v": 1}))),
            mutation(AuditAction::Update, Some(json!({"v": 1})), Some(json!({"v": 2}))),
            mutation(AuditAction::Update, Some(json!({"v": 2})), Some(json!({"v": 3}))),
        ];
        let mut entries = Vec::new();
        for step in steps {
            let mut tx = Transaction::begin(Arc::clone(kv));
            entries.push(recorder.record_mutation(&mut tx, step).await.unwrap());
            tx.commit().await.unwrap();
        }
        entries
    }

    #[tokio::test]
    async fn test_valid_chain() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let written = seed(&kv).await;
        let log = AuditLog::new(Arc::clone(&kv));

        let result = log.verify_chain("purchase_order", 1).await.unwrap();
        assert!(result.valid, "{:?}", result.issues);
        assert_eq!(result.entries_verified, 3);

        let history = log.history("purchase_order", 1).await.unwrap();
        assert_eq!(history, written);

        let recent = log.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, written[2].id);
        assert_eq!(log.count().await.unwrap(), 3);
        assert_eq!(log.entry(written[1].id).await.unwrap().unwrap(), written[1]);
    }

    #[tokio::test]
    async fn test_tampered_entry_detected() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let written = seed(&kv).await;

        let mut tampered = written[1].clone();
        tampered.new_state = Some(json!({"v": 99}));
        kv.set(
            NS_ENTRIES,
            &tampered.id.to_string(),
            serde_json::to_vec(&tampered).unwrap(),
        )
        .await
        .unwrap();

        let result = AuditLog::new(kv)
            .verify_chain("purchase_order", 1)
            .await
            .unwrap();
        assert!(!result.valid);
        assert!(result.issues.contains(&ChainIssue::InvalidSignature {
            entry_id: tampered.id
        }));
        assert!(result
            .issues
            .iter()
            .any(|i| matches!(i, ChainIssue::BrokenLink { entry_id, .. } if *entry_id == written[2].id)));
        assert!(result.issues.contains(&ChainIssue::StateMismatch {
            entry_id: written[2].id
        }));
    }

    #[tokio::test]
    async fn test_verify_all_lists_streams() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        seed(&kv).await;
        let results = AuditLog::new(kv).verify_all().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, StreamKey::new("purchase_order", 1));
        assert!(results[0].1.valid);
    }
}
