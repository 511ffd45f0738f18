//! Where audit entries are written.
//!
//! A sink stages entries into the caller's [`Transaction`], so an entry
//! becomes durable exactly when the mutation it describes commits.
//!
//! | Namespace | Key | Value |
//! |---|---|---|
//! | `audit_entries` | entry id | [`AuditEntry`] JSON |
//! | `audit_streams` | `{table}:{record}` | [`StreamIndex`] |
//! | `audit_timeline` | `{nanos}:{entry id}` | entry id |

use async_trait::async_trait;
use procura_crypto::ContentHash;
use procura_storage::Transaction;
use serde::{Deserialize, Serialize};

use crate::entry::{AuditEntry, AuditEntryId, StreamKey};
use crate::error::AuditResult;

pub(crate) const NS_ENTRIES: &str = "audit_entries";
pub(crate) const NS_STREAMS: &str = "audit_streams";
pub(crate) const NS_TIMELINE: &str = "audit_timeline";

/// Entries of one stream in append order, plus the hash to link the next
/// entry to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamIndex {
    /// Entry ids, oldest first.
    pub entries: Vec<AuditEntryId>,
    /// Content hash of the newest entry.
    pub head: ContentHash,
}

impl Default for StreamIndex {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            head: ContentHash::zero(),
        }
    }
}

fn timeline_key(entry: &AuditEntry) -> String {
    let nanos = entry
        .timestamp
        .0
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0);
    format!("{nanos:020}:{}", entry.id)
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Hash the next entry of `stream` must link to. Reading the head
    /// guards it, so two transactions appending to the same stream
    /// conflict instead of forking the chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream index cannot be read.
    async fn head(&self, tx: &mut Transaction, stream: &StreamKey) -> AuditResult<ContentHash>;

    /// Stage an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be staged. The caller must then
    /// abandon the transaction.
    async fn append(&self, tx: &mut Transaction, entry: &AuditEntry) -> AuditResult<()>;
}

/// The [`AuditSink`] that writes into the engine's own store.
#[derive(Debug, Clone, Copy, Default)]
pub struct KvAuditSink;

impl KvAuditSink {
    /// Create a sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for KvAuditSink {
    async fn head(&self, tx: &mut Transaction, stream: &StreamKey) -> AuditResult<ContentHash> {
        let index: Option<StreamIndex> = tx
            .get_json_for_update(NS_STREAMS, &stream.storage_key())
            .await?;
        Ok(index.map_or_else(ContentHash::zero, |i| i.head))
    }

    async fn append(&self, tx: &mut Transaction, entry: &AuditEntry) -> AuditResult<()> {
        let stream = entry.stream();
        let mut index: StreamIndex = tx
            .get_json_for_update(NS_STREAMS, &stream.storage_key())
            .await?
            .unwrap_or_default();
        index.entries.push(entry.id);
        index.head = entry.content_hash();

        tx.set_json(NS_ENTRIES, &entry.id.to_string(), entry)?;
        tx.set_json(NS_STREAMS, &stream.storage_key(), &index)?;
        tx.set_json(NS_TIMELINE, &timeline_key(entry), &entry.id)?;
        Ok(())
    }
}
