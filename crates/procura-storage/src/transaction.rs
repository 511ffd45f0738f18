//! Request-scoped transactions.
//!
//! A [`Transaction`] stages writes in memory and reads through to the store,
//! so a request sees committed data plus its own pending writes. Nothing
//! reaches the store until [`Transaction::commit`]; dropping the transaction
//! (or calling [`Transaction::rollback`]) discards every staged write.
//!
//! Keys read with [`Transaction::get_for_update`] become guards: if another
//! transaction commits a change to one of them first, this commit fails with
//! [`StorageError::Conflict`] and nothing is written.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::batch::WriteBatch;
use crate::error::{StorageError, StorageResult};
use crate::kv::{KvStore, validate_key, validate_namespace};

type Slot = (String, String);

/// A unit of work against a [`KvStore`].
pub struct Transaction {
    store: Arc<dyn KvStore>,
    writes: BTreeMap<Slot, Option<Vec<u8>>>,
    guards: BTreeMap<Slot, Option<Vec<u8>>>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("pending_writes", &self.writes.len())
            .field("guards", &self.guards.len())
            .finish_non_exhaustive()
    }
}

fn slot(namespace: &str, key: &str) -> Slot {
    (namespace.to_string(), key.to_string())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl Transaction {
    /// Start a transaction on `store`.
    #[must_use]
    pub fn begin(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            writes: BTreeMap::new(),
            guards: BTreeMap::new(),
        }
    }

    /// The store this transaction commits to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Read a value, preferring this transaction's own staged writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the store read fails.
    pub async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let slot = slot(namespace, key);
        if let Some(staged) = self.writes.get(&slot) {
            return Ok(staged.clone());
        }
        if let Some(observed) = self.guards.get(&slot) {
            return Ok(observed.clone());
        }
        self.store.get(namespace, key).await
    }

    /// Read a value and require it to be unchanged at commit time.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the store read fails.
    pub async fn get_for_update(
        &mut self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let slot = slot(namespace, key);
        if let Some(staged) = self.writes.get(&slot) {
            return Ok(staged.clone());
        }
        if let Some(observed) = self.guards.get(&slot) {
            return Ok(observed.clone());
        }
        let observed = self.store.get(namespace, key).await?;
        trace!(namespace, key, "Guarding key for update");
        self.guards.insert(slot, observed.clone());
        Ok(observed)
    }

    /// Stage a write.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid namespace or key.
    pub fn set(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        self.writes.insert(slot(namespace, key), Some(value));
        Ok(())
    }

    /// Stage a delete.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid namespace or key.
    pub fn delete(&mut self, namespace: &str, key: &str) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        self.writes.insert(slot(namespace, key), None);
        Ok(())
    }

    /// List the keys of a namespace as this transaction sees them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store listing fails.
    pub async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let mut keys: BTreeSet<String> = self.store.list_keys(namespace).await?.into_iter().collect();
        for ((ns, key), value) in &self.writes {
            if ns != namespace {
                continue;
            }
            if value.is_some() {
                keys.insert(key.clone());
            } else {
                keys.remove(key);
            }
        }
        Ok(keys.into_iter().collect())
    }

    /// Read and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored bytes are not
    /// valid JSON for `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<Option<T>> {
        self.get(namespace, key)
            .await?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// [`get_for_update`](Self::get_for_update) with JSON decoding.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] on decoding failure.
    pub async fn get_json_for_update<T: DeserializeOwned>(
        &mut self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<Option<T>> {
        self.get_for_update(namespace, key)
            .await?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Serialize a value as JSON and stage it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if serialization fails.
    pub fn set_json<T: Serialize + ?Sized>(
        &mut self,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(namespace, key, bytes)
    }

    /// Members of a set-valued index row. Empty if the row is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the row is corrupt.
    pub async fn index_members<T: DeserializeOwned + Ord>(
        &self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<BTreeSet<T>> {
        Ok(self.get_json(namespace, key).await?.unwrap_or_default())
    }

    /// [`index_members`](Self::index_members), guarding the row so that a
    /// concurrent insert or removal fails this commit.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the row is corrupt.
    pub async fn index_members_for_update<T: DeserializeOwned + Ord>(
        &mut self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<BTreeSet<T>> {
        Ok(self
            .get_json_for_update(namespace, key)
            .await?
            .unwrap_or_default())
    }

    /// Add `item` to an index row. Returns `false` if it was already present.
    ///
    /// The row is read for update, so concurrent edits to the same row
    /// conflict at commit instead of losing an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be read or encoded.
    pub async fn index_insert<T: Serialize + DeserializeOwned + Ord>(
        &mut self,
        namespace: &str,
        key: &str,
        item: T,
    ) -> StorageResult<bool> {
        let mut members: BTreeSet<T> = self
            .get_json_for_update(namespace, key)
            .await?
            .unwrap_or_default();
        let added = members.insert(item);
        if added {
            self.set_json(namespace, key, &members)?;
        }
        Ok(added)
    }

    /// Remove `item` from an index row, deleting the row once empty.
    /// Returns `false` if it was not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be read or encoded.
    pub async fn index_remove<T: Serialize + DeserializeOwned + Ord>(
        &mut self,
        namespace: &str,
        key: &str,
        item: &T,
    ) -> StorageResult<bool> {
        let mut members: BTreeSet<T> = self
            .get_json_for_update(namespace, key)
            .await?
            .unwrap_or_default();
        if !members.remove(item) {
            return Ok(false);
        }
        if members.is_empty() {
            self.delete(namespace, key)?;
        } else {
            self.set_json(namespace, key, &members)?;
        }
        Ok(true)
    }

    /// Allocate an identifier from a named sequence.
    ///
    /// Sequence allocation bypasses the transaction: an aborted transaction
    /// leaves a gap, never a reused identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot allocate.
    pub async fn next_id(&self, sequence: &str) -> StorageResult<u64> {
        self.store.next_sequence(sequence).await
    }

    /// Number of staged writes.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Apply every staged write atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if a guarded key changed since it
    /// was read, or the store's error if the batch cannot be applied. In
    /// both cases nothing is written.
    pub async fn commit(self) -> StorageResult<()> {
        if self.writes.is_empty() {
            trace!("Read-only transaction, nothing to commit");
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for ((namespace, key), expected) in self.guards {
            batch.guard(namespace, key, expected);
        }
        for ((namespace, key), value) in self.writes {
            match value {
                Some(bytes) => batch.set(namespace, key, bytes),
                None => batch.delete(namespace, key),
            }
        }
        let ops = batch.len();
        self.store.apply(batch).await?;
        debug!(ops, "Transaction committed");
        Ok(())
    }

    /// Discard every staged write.
    pub fn rollback(self) {
        debug!(discarded = self.writes.len(), "Transaction rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    fn store() -> Arc<dyn KvStore> {
        Arc::new(MemoryKvStore::new())
    }

    #[tokio::test]
    async fn test_reads_see_own_writes() {
        let store = store();
        store.set("records", "1", b"committed".to_vec()).await.unwrap();

        let mut tx = Transaction::begin(Arc::clone(&store));
        assert_eq!(tx.get("records", "1").await.unwrap(), Some(b"committed".to_vec()));

        tx.set("records", "1", b"staged".to_vec()).unwrap();
        tx.set("records", "2", b"new".to_vec()).unwrap();
        assert_eq!(tx.get("records", "1").await.unwrap(), Some(b"staged".to_vec()));
        assert_eq!(tx.list_keys("records").await.unwrap(), vec!["1", "2"]);

        tx.delete("records", "1").unwrap();
        assert!(tx.get("records", "1").await.unwrap().is_none());
        assert_eq!(tx.list_keys("records").await.unwrap(), vec!["2"]);

        // Nothing visible outside the transaction yet.
        assert_eq!(store.get("records", "1").await.unwrap(), Some(b"committed".to_vec()));
        assert!(store.get("records", "2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_and_rollback() {
        let store = store();

        let mut tx = Transaction::begin(Arc::clone(&store));
        tx.set_json("grants", "1", &serde_json::json!({"level": "Read"})).unwrap();
        tx.rollback();
        assert!(store.get("grants", "1").await.unwrap().is_none());

        let mut tx = Transaction::begin(Arc::clone(&store));
        tx.set_json("grants", "1", &serde_json::json!({"level": "Read"})).unwrap();
        assert_eq!(tx.pending_writes(), 1);
        tx.commit().await.unwrap();

        let tx = Transaction::begin(Arc::clone(&store));
        let value: serde_json::Value = tx.get_json("grants", "1").await.unwrap().unwrap();
        assert_eq!(value["level"], "Read");
    }

    #[tokio::test]
    async fn test_conflicting_commit_fails_cleanly() {
        let store = store();
        store.set("audit", "head", b"h0".to_vec()).await.unwrap();

        let mut first = Transaction::begin(Arc::clone(&store));
        let mut second = Transaction::begin(Arc::clone(&store));
        assert_eq!(first.get_for_update("audit", "head").await.unwrap(), Some(b"h0".to_vec()));
        assert_eq!(second.get_for_update("audit", "head").await.unwrap(), Some(b"h0".to_vec()));

        first.set("audit", "head", b"h1".to_vec()).unwrap();
        second.set("audit", "head", b"h1-other".to_vec()).unwrap();
        second.set("audit", "entry-2", b"e".to_vec()).unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert_eq!(store.get("audit", "head").await.unwrap(), Some(b"h1".to_vec()));
        assert!(store.get("audit", "entry-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guarded_read_is_stable() {
        let store = store();
        store.set("ns", "k", b"v1".to_vec()).await.unwrap();

        let mut tx = Transaction::begin(Arc::clone(&store));
        tx.get_for_update("ns", "k").await.unwrap();
        store.set("ns", "k", b"v2".to_vec()).await.unwrap();
        assert_eq!(tx.get("ns", "k").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn test_index_rows() {
        let store = store();
        let mut tx = Transaction::begin(Arc::clone(&store));
        assert!(tx.index_insert("by_group", "g1", 3u64).await.unwrap());
        assert!(tx.index_insert("by_group", "g1", 1u64).await.unwrap());
        assert!(!tx.index_insert("by_group", "g1", 3u64).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = Transaction::begin(Arc::clone(&store));
        let members: BTreeSet<u64> = tx.index_members("by_group", "g1").await.unwrap();
        assert_eq!(members.into_iter().collect::<Vec<_>>(), vec![1, 3]);

        assert!(tx.index_remove("by_group", "g1", &1u64).await.unwrap());
        assert!(tx.index_remove("by_group", "g1", &3u64).await.unwrap());
        assert!(!tx.index_remove("by_group", "g1", &3u64).await.unwrap());
        tx.commit().await.unwrap();
        assert!(!store.exists("by_group", "g1").await.unwrap());
    }

    #[tokio::test]
    async fn test_guarded_index_read_conflicts_with_insert() {
        let store = store();
        let mut reader = Transaction::begin(Arc::clone(&store));
        let seen: BTreeSet<u64> = reader
            .index_members_for_update("refs", "parent")
            .await
            .unwrap();
        assert!(seen.is_empty());

        let mut writer = Transaction::begin(Arc::clone(&store));
        writer.index_insert("refs", "parent", 9u64).await.unwrap();
        writer.commit().await.unwrap();

        reader.delete("rows", "parent").unwrap();
        assert!(matches!(
            reader.commit().await,
            Err(StorageError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_next_id_survives_rollback() {
        let store = store();
        let tx = Transaction::begin(Arc::clone(&store));
        assert_eq!(tx.next_id("record").await.unwrap(), 1);
        tx.rollback();

        let tx = Transaction::begin(store);
        assert_eq!(tx.next_id("record").await.unwrap(), 2);
    }
}
