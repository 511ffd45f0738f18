//! Persistence for owned records and their lookup indexes.
//!
//! Layout:
//!
//! | Namespace | Key | Value |
//! |---|---|---|
//! | `record:{table}` | id | [`OwnedRecord`] JSON |
//! | `record_refs` | `{table}:{id}` | records pointing at this one |
//! | `record_creators` | `{table}:{actor}` | ids created by the actor |
//! | `record_groups` | `{table}:{group}` | ids owned by the group |
//!
//! Index rows are maintained inside the caller's transaction, so they commit
//! or roll back together with the record itself.

use std::collections::BTreeSet;

use procura_core::{ActorId, EntityType, GroupId, OwnedRecord, RecordId, RecordRef};
use procura_storage::Transaction;
use tracing::trace;

use crate::error::{RecordError, RecordResult};

const NS_REFS: &str = "record_refs";
const NS_CREATORS: &str = "record_creators";
const NS_GROUPS: &str = "record_groups";

fn records_ns(entity_type: EntityType) -> String {
    format!("record:{}", entity_type.table_name())
}

fn ref_key(target: RecordRef) -> String {
    format!("{}:{}", target.entity_type.table_name(), target.id.storage_key())
}

fn creator_key(entity_type: EntityType, actor: ActorId) -> String {
    format!("{}:{}", entity_type.table_name(), actor.storage_key())
}

fn group_key(entity_type: EntityType, group: GroupId) -> String {
    format!("{}:{}", entity_type.table_name(), group.storage_key())
}

/// Handle for reading and writing owned records inside a transaction.
///
/// Holds no state of its own; everything lives in the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordStore;

impl RecordStore {
    /// Create a handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Allocate a fresh identifier for `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence cannot be advanced.
    pub async fn allocate_id(
        &self,
        tx: &Transaction,
        entity_type: EntityType,
    ) -> RecordResult<RecordId> {
        let raw = tx.next_id(&records_ns(entity_type)).await?;
        Ok(RecordId::new(raw))
    }

    /// Load a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored record is corrupt.
    pub async fn get(
        &self,
        tx: &Transaction,
        entity_type: EntityType,
        id: RecordId,
    ) -> RecordResult<Option<OwnedRecord>> {
        Ok(tx
            .get_json(&records_ns(entity_type), &id.storage_key())
            .await?)
    }

    /// Load a record and guard it against concurrent modification.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored record is corrupt.
    pub async fn get_for_update(
        &self,
        tx: &mut Transaction,
        entity_type: EntityType,
        id: RecordId,
    ) -> RecordResult<Option<OwnedRecord>> {
        Ok(tx
            .get_json_for_update(&records_ns(entity_type), &id.storage_key())
            .await?)
    }

    /// Load a record that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if it is absent.
    pub async fn require(
        &self,
        tx: &Transaction,
        entity_type: EntityType,
        id: RecordId,
    ) -> RecordResult<OwnedRecord> {
        self.get(tx, entity_type, id)
            .await?
            .ok_or(RecordError::NotFound(RecordRef::new(entity_type, id)))
    }

    /// Whether a record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn exists(&self, tx: &Transaction, target: RecordRef) -> RecordResult<bool> {
        Ok(tx
            .get(&records_ns(target.entity_type), &target.id.storage_key())
            .await?
            .is_some())
    }

    /// Stage a new record and its index rows.
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    pub async fn insert(&self, tx: &mut Transaction, record: &OwnedRecord) -> RecordResult<()> {
        let this = record.record_ref();
        tx.set_json(&records_ns(record.entity_type), &record.id.storage_key(), record)?;

        for target in record.references() {
            tx.index_insert(NS_REFS, &ref_key(*target), this).await?;
        }
        tx.index_insert(
            NS_CREATORS,
            &creator_key(record.entity_type, record.created_by),
            record.id,
        )
        .await?;
        if let Some(group) = record.owner_group {
            tx.index_insert(NS_GROUPS, &group_key(record.entity_type, group), record.id)
                .await?;
        }
        trace!(record = %this, "Staged record insert");
        Ok(())
    }

    /// Stage a replacement of `before` with `after`.
    ///
    /// References and creator are immutable; only the owner-group index
    /// needs to follow a change.
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    pub async fn update(
        &self,
        tx: &mut Transaction,
        before: &OwnedRecord,
        after: &OwnedRecord,
    ) -> RecordResult<()> {
        tx.set_json(&records_ns(after.entity_type), &after.id.storage_key(), after)?;

        if before.owner_group != after.owner_group {
            if let Some(old) = before.owner_group {
                tx.index_remove(NS_GROUPS, &group_key(before.entity_type, old), &before.id)
                    .await?;
            }
            if let Some(new) = after.owner_group {
                tx.index_insert(NS_GROUPS, &group_key(after.entity_type, new), after.id)
                    .await?;
            }
        }
        trace!(record = %after.record_ref(), "Staged record update");
        Ok(())
    }

    /// Stage removal of a record and its index rows.
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    pub async fn remove(&self, tx: &mut Transaction, record: &OwnedRecord) -> RecordResult<()> {
        let this = record.record_ref();
        tx.delete(&records_ns(record.entity_type), &record.id.storage_key())?;

        for target in record.references() {
            tx.index_remove(NS_REFS, &ref_key(*target), &this).await?;
        }
        tx.index_remove(
            NS_CREATORS,
            &creator_key(record.entity_type, record.created_by),
            &record.id,
        )
        .await?;
        if let Some(group) = record.owner_group {
            tx.index_remove(NS_GROUPS, &group_key(record.entity_type, group), &record.id)
                .await?;
        }
        trace!(record = %this, "Staged record removal");
        Ok(())
    }

    /// Every id of `entity_type`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails or a key is not an id.
    pub async fn list_ids(
        &self,
        tx: &Transaction,
        entity_type: EntityType,
    ) -> RecordResult<Vec<RecordId>> {
        tx.list_keys(&records_ns(entity_type))
            .await?
            .iter()
            .map(|key| key.parse::<RecordId>().map_err(RecordError::from))
            .collect()
    }

    /// Records that point at `target` through their parent or links.
    ///
    /// # Errors
    ///
    /// Returns an error if the index row cannot be read.
    pub async fn referencing(
        &self,
        tx: &Transaction,
        target: RecordRef,
    ) -> RecordResult<BTreeSet<RecordRef>> {
        Ok(tx.index_members(NS_REFS, &ref_key(target)).await?)
    }

    /// [`referencing`](Self::referencing), guarded so that a reference added
    /// or dropped by a concurrent writer fails this transaction's commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the index row cannot be read.
    pub async fn referencing_for_update(
        &self,
        tx: &mut Transaction,
        target: RecordRef,
    ) -> RecordResult<BTreeSet<RecordRef>> {
        Ok(tx
            .index_members_for_update(NS_REFS, &ref_key(target))
            .await?)
    }

    /// Records of `source_type` that point at `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index row cannot be read.
    pub async fn referencing_of_type(
        &self,
        tx: &Transaction,
        target: RecordRef,
        source_type: EntityType,
    ) -> RecordResult<Vec<RecordId>> {
        Ok(self
            .referencing(tx, target)
            .await?
            .into_iter()
            .filter(|r| r.entity_type == source_type)
            .map(|r| r.id)
            .collect())
    }

    /// Ids of `entity_type` created by `actor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index row cannot be read.
    pub async fn created_by(
        &self,
        tx: &Transaction,
        entity_type: EntityType,
        actor: ActorId,
    ) -> RecordResult<BTreeSet<RecordId>> {
        Ok(tx
            .index_members(NS_CREATORS, &creator_key(entity_type, actor))
            .await?)
    }

    /// Ids of `entity_type` owned by `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index row cannot be read.
    pub async fn owned_by_group(
        &self,
        tx: &Transaction,
        entity_type: EntityType,
        group: GroupId,
    ) -> RecordResult<BTreeSet<RecordId>> {
        Ok(tx
            .index_members(NS_GROUPS, &group_key(entity_type, group))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use procura_core::Timestamp;
    use procura_storage::{KvStore, MemoryKvStore};

    use super::*;

    fn record(
        entity_type: EntityType,
        id: u64,
        group: Option<u64>,
        parent: Option<RecordRef>,
    ) -> OwnedRecord {
        OwnedRecord {
            entity_type,
            id: RecordId::new(id),
            owner_group: group.map(GroupId::new),
            parent,
            links: Vec::new(),
            status: None,
            draft_sealed: false,
            created_by: ActorId::new(1),
            updated_by: None,
            created_at: Timestamp::now(),
            updated_at: None,
            fields: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_indexes() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let records = RecordStore::new();

        let mut tx = Transaction::begin(Arc::clone(&store));
        let parent = record(EntityType::LineItem, 1, Some(10), None);
        let child = record(
            EntityType::WorkBreakdown,
            1,
            Some(10),
            Some(parent.record_ref()),
        );
        records.insert(&mut tx, &parent).await.unwrap();
        records.insert(&mut tx, &child).await.unwrap();
        tx.commit().await.unwrap();

        let tx = Transaction::begin(Arc::clone(&store));
        assert_eq!(
            records.require(&tx, EntityType::WorkBreakdown, RecordId::new(1)).await.unwrap(),
            child
        );
        let refs = records.referencing(&tx, parent.record_ref()).await.unwrap();
        assert!(refs.contains(&child.record_ref()));
        assert!(records
            .created_by(&tx, EntityType::LineItem, ActorId::new(1))
            .await
            .unwrap()
            .contains(&RecordId::new(1)));
        assert_eq!(
            records
                .owned_by_group(&tx, EntityType::WorkBreakdown, GroupId::new(10))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            records.list_ids(&tx, EntityType::LineItem).await.unwrap(),
            vec![RecordId::new(1)]
        );
    }

    #[tokio::test]
    async fn test_update_moves_group_index() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let records = RecordStore::new();
        let before = record(EntityType::BudgetItem, 4, Some(1), None);

        let mut tx = Transaction::begin(Arc::clone(&store));
        records.insert(&mut tx, &before).await.unwrap();
        let mut after = before.clone();
        after.owner_group = Some(GroupId::new(2));
        records.update(&mut tx, &before, &after).await.unwrap();
        tx.commit().await.unwrap();

        let tx = Transaction::begin(store);
        assert!(records
            .owned_by_group(&tx, EntityType::BudgetItem, GroupId::new(1))
            .await
            .unwrap()
            .is_empty());
        assert!(records
            .owned_by_group(&tx, EntityType::BudgetItem, GroupId::new(2))
            .await
            .unwrap()
            .contains(&RecordId::new(4)));
    }

    #[tokio::test]
    async fn test_remove_clears_everything() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let records = RecordStore::new();
        let parent = record(EntityType::PurchaseOrder, 2, Some(3), None);
        let receipt = record(EntityType::GoodsReceipt, 5, Some(3), Some(parent.record_ref()));

        let mut tx = Transaction::begin(Arc::clone(&store));
        records.insert(&mut tx, &receipt).await.unwrap();
        records.remove(&mut tx, &receipt).await.unwrap();
        tx.commit().await.unwrap();

        let tx = Transaction::begin(store);
        assert!(records.referencing(&tx, parent.record_ref()).await.unwrap().is_empty());
        assert!(!records.exists(&tx, receipt.record_ref()).await.unwrap());
        assert!(records.list_ids(&tx, EntityType::GoodsReceipt).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_allocate_id_per_type() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let records = RecordStore::new();
        let tx = Transaction::begin(store);
        assert_eq!(records.allocate_id(&tx, EntityType::Asset).await.unwrap(), RecordId::new(1));
        assert_eq!(records.allocate_id(&tx, EntityType::Asset).await.unwrap(), RecordId::new(2));
        assert_eq!(records.allocate_id(&tx, EntityType::LineItem).await.unwrap(), RecordId::new(1));
    }
}
