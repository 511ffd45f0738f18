//! Raw key-value store trait and its backends.
//!
//! The [`KvStore`] trait exposes namespaced byte-level reads plus one write
//! path that matters: [`KvStore::apply`], which lands a [`WriteBatch`]
//! atomically. Single-key `set`/`delete` exist for tooling and tests.
//!
//! - **In-memory** (always available): tests and ephemeral deployments
//! - **`SurrealKV`** (behind the `kv` feature): persistent, ACID, embedded
//!
//! Keys are stored as `"{namespace}\0{key}"`, so the null byte is reserved.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::batch::{WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};

/// Namespace holding sequence counters.
const SEQUENCE_NAMESPACE: &str = "sequence";

pub(crate) fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey("namespace must not be empty".into()));
    }
    if namespace.contains('\0') {
        return Err(StorageError::InvalidKey(format!(
            "namespace {namespace:?} contains a null byte"
        )));
    }
    Ok(())
}

pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(format!(
            "key {key:?} contains a null byte"
        )));
    }
    Ok(())
}

fn validate_batch(batch: &WriteBatch) -> StorageResult<()> {
    for guard in &batch.guards {
        validate_namespace(&guard.namespace)?;
        validate_key(&guard.key)?;
    }
    for op in &batch.ops {
        let (namespace, key) = op.target();
        validate_namespace(namespace)?;
        validate_key(key)?;
    }
    Ok(())
}

fn decode_counter(raw: Option<&[u8]>) -> StorageResult<u64> {
    match raw {
        None => Ok(0),
        Some(bytes) => {
            let array: [u8; 8] = bytes.try_into().map_err(|_| {
                StorageError::Serialization(format!("corrupt sequence counter ({} bytes)", bytes.len()))
            })?;
            Ok(u64::from_be_bytes(array))
        },
    }
}

fn bump_counter(current: u64, sequence: &str) -> StorageResult<u64> {
    current
        .checked_add(1)
        .ok_or_else(|| StorageError::Internal(format!("sequence {sequence} exhausted")))
}

/// Raw namespaced key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value. `None` if the key does not exist.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set a single value outside any batch.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Delete a single key. Returns `true` if it existed.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Check if a key exists.
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Ok(self.get(namespace, key).await?.is_some())
    }

    /// List the keys of a namespace in ascending order.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Apply a batch atomically.
    ///
    /// All guards are checked first; a mismatch fails the whole batch with
    /// [`StorageError::Conflict`] and nothing is written.
    async fn apply(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Allocate the next value of a named counter, starting at 1.
    ///
    /// Allocation is durable immediately and never rolled back, so values
    /// are unique even across aborted transactions.
    async fn next_sequence(&self, sequence: &str) -> StorageResult<u64>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory store. A single lock covers the whole map, so every batch is
/// trivially atomic and isolated.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{namespace}\0{key}")
    }

    fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
        StorageError::Internal(format!("memory store lock poisoned: {e}"))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let data = self.data.read().map_err(Self::poisoned)?;
        Ok(data.get(&Self::full_key(namespace, key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.write().map_err(Self::poisoned)?;
        data.insert(Self::full_key(namespace, key), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.write().map_err(Self::poisoned)?;
        Ok(data.remove(&Self::full_key(namespace, key)).is_some())
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let data = self.data.read().map_err(Self::poisoned)?;
        let prefix = format!("{namespace}\0");
        Ok(data
            .range(prefix.clone()..)
            .map_while(|(k, _)| k.strip_prefix(&prefix).map(String::from))
            .collect())
    }

    async fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        validate_batch(&batch)?;
        let mut data = self.data.write().map_err(Self::poisoned)?;

        for guard in &batch.guards {
            let current = data.get(&Self::full_key(&guard.namespace, &guard.key));
            if current != guard.expected.as_ref() {
                return Err(StorageError::Conflict {
                    namespace: guard.namespace.clone(),
                    key: guard.key.clone(),
                });
            }
        }

        for op in batch.ops {
            match op {
                WriteOp::Set {
                    namespace,
                    key,
                    value,
                } => {
                    data.insert(Self::full_key(&namespace, &key), value);
                },
                WriteOp::Delete { namespace, key } => {
                    data.remove(&Self::full_key(&namespace, &key));
                },
            }
        }
        Ok(())
    }

    async fn next_sequence(&self, sequence: &str) -> StorageResult<u64> {
        validate_key(sequence)?;
        let mut data = self.data.write().map_err(Self::poisoned)?;
        let full = Self::full_key(SEQUENCE_NAMESPACE, sequence);
        let next = bump_counter(decode_counter(data.get(&full).map(Vec::as_slice))?, sequence)?;
        data.insert(full, next.to_be_bytes().to_vec());
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// SurrealKV implementation (behind `kv` feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "kv")]
fn composite_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(key.len()).saturating_add(1));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(0);
    buf.extend_from_slice(key.as_bytes());
    buf
}

/// `["{namespace}\0", "{namespace}\x01")` covers exactly the namespace.
#[cfg(feature = "kv")]
fn namespace_range(namespace: &str) -> (Vec<u8>, Vec<u8>) {
    let mut start = namespace.as_bytes().to_vec();
    let mut end = start.clone();
    start.push(0);
    end.push(1);
    (start, end)
}

#[cfg(feature = "kv")]
fn map_kv_err(e: &surrealkv::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

/// Persistent store backed by `SurrealKV`.
///
/// Every batch runs in one `SurrealKV` transaction; guards are re-read inside
/// it so the check and the writes commit together.
#[cfg(feature = "kv")]
pub struct SurrealKvStore {
    tree: surrealkv::Tree,
    sequence_lock: tokio::sync::Mutex<()>,
}

#[cfg(feature = "kv")]
impl std::fmt::Debug for SurrealKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealKvStore").finish_non_exhaustive()
    }
}

#[cfg(feature = "kv")]
impl SurrealKvStore {
    /// Open (or create) a store in `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the tree cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        let tree = surrealkv::TreeBuilder::new()
            .with_path(path.as_ref().to_path_buf())
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        tracing::debug!(path = %path.as_ref().display(), "Opened SurrealKV store");
        Ok(Self {
            tree,
            sequence_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Flush and close the store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the flush fails.
    pub async fn close(&self) -> StorageResult<()> {
        self.tree
            .close()
            .await
            .map_err(|ref e| map_kv_err(e))
    }
}

#[cfg(feature = "kv")]
#[async_trait]
impl KvStore for SurrealKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        tx.get(&composite_key(namespace, key))
            .map_err(|ref e| map_kv_err(e))
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.set(namespace, key, value);
        self.apply(batch).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let existed = self.get(namespace, key).await?.is_some();
        if existed {
            let mut batch = WriteBatch::new();
            batch.delete(namespace, key);
            self.apply(batch).await?;
        }
        Ok(existed)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let (start, end) = namespace_range(namespace);
        let prefix_len = start.len();

        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        let mut iter = tx.range(&start, &end).map_err(|ref e| map_kv_err(e))?;
        iter.seek_first().map_err(|ref e| map_kv_err(e))?;

        let mut keys = Vec::new();
        while iter.valid() {
            let raw = iter.key();
            if let Some(tail) = raw.get(prefix_len..)
                && let Ok(key) = std::str::from_utf8(tail)
                && !key.is_empty()
            {
                keys.push(key.to_string());
            }
            iter.next().map_err(|ref e| map_kv_err(e))?;
        }
        Ok(keys)
    }

    async fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        validate_batch(&batch)?;
        if batch.is_empty() && batch.guards.is_empty() {
            return Ok(());
        }
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;

        for guard in &batch.guards {
            let current = tx
                .get(&composite_key(&guard.namespace, &guard.key))
                .map_err(|ref e| map_kv_err(e))?;
            if current != guard.expected {
                return Err(StorageError::Conflict {
                    namespace: guard.namespace.clone(),
                    key: guard.key.clone(),
                });
            }
        }

        for op in &batch.ops {
            match op {
                WriteOp::Set {
                    namespace,
                    key,
                    value,
                } => tx
                    .set(&composite_key(namespace, key), value)
                    .map_err(|ref e| map_kv_err(e))?,
                WriteOp::Delete { namespace, key } => tx
                    .delete(&composite_key(namespace, key))
                    .map_err(|ref e| map_kv_err(e))?,
            }
        }

        tx.commit().await.map_err(|ref e| map_kv_err(e))
    }

    async fn next_sequence(&self, sequence: &str) -> StorageResult<u64> {
        validate_key(sequence)?;
        let _held = self.sequence_lock.lock().await;
        let ck = composite_key(SEQUENCE_NAMESPACE, sequence);

        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        let current = tx.get(&ck).map_err(|ref e| map_kv_err(e))?;
        let next = bump_counter(decode_counter(current.as_deref())?, sequence)?;
        tx.set(&ck, &next.to_be_bytes())
            .map_err(|ref e| map_kv_err(e))?;
        tx.commit().await.map_err(|ref e| map_kv_err(e))?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_get_set_delete() {
        let store = MemoryKvStore::new();
        store.set("grants", "1", b"g".to_vec()).await.unwrap();
        assert_eq!(store.get("grants", "1").await.unwrap(), Some(b"g".to_vec()));
        assert!(store.exists("grants", "1").await.unwrap());
        assert!(store.delete("grants", "1").await.unwrap());
        assert!(!store.delete("grants", "1").await.unwrap());
        assert!(store.get("grants", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_list_keys_sorted_and_isolated() {
        let store = MemoryKvStore::new();
        store.set("records", "b", b"2".to_vec()).await.unwrap();
        store.set("records", "a", b"1".to_vec()).await.unwrap();
        store.set("recordsx", "c", b"3".to_vec()).await.unwrap();
        store.set("other", "d", b"4".to_vec()).await.unwrap();

        assert_eq!(store.list_keys("records").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_apply_is_all_or_nothing() {
        let store = MemoryKvStore::new();
        store.set("ns", "head", b"v1".to_vec()).await.unwrap();

        let mut stale = WriteBatch::new();
        stale.guard("ns", "head", Some(b"v0".to_vec()));
        stale.set("ns", "head", b"v2".to_vec());
        stale.set("ns", "other", b"x".to_vec());

        let err = store.apply(stale).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { ref key, .. } if key == "head"));
        assert_eq!(store.get("ns", "head").await.unwrap(), Some(b"v1".to_vec()));
        assert!(store.get("ns", "other").await.unwrap().is_none());

        let mut fresh = WriteBatch::new();
        fresh.guard("ns", "head", Some(b"v1".to_vec()));
        fresh.guard("ns", "absent", None);
        fresh.set("ns", "head", b"v2".to_vec());
        fresh.delete("ns", "missing-is-fine");
        store.apply(fresh).await.unwrap();
        assert_eq!(store.get("ns", "head").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let store = MemoryKvStore::new();
        assert!(store.get("", "k").await.is_err());
        assert!(store.set("ns", "", vec![]).await.is_err());

        let mut batch = WriteBatch::new();
        batch.set("ns", "bad\0key", vec![]);
        assert!(matches!(
            store.apply(batch).await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_sequences_are_independent_and_monotonic() {
        let store = MemoryKvStore::new();
        assert_eq!(store.next_sequence("grant").await.unwrap(), 1);
        assert_eq!(store.next_sequence("grant").await.unwrap(), 2);
        assert_eq!(store.next_sequence("actor").await.unwrap(), 1);
    }

    #[cfg(feature = "kv")]
    #[tokio::test]
    async fn test_surrealkv_batch_and_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = SurrealKvStore::open(dir.path().join("kv")).unwrap();

        let mut batch = WriteBatch::new();
        batch.guard("ns", "a", None);
        batch.set("ns", "a", b"1".to_vec());
        batch.set("ns", "b", b"2".to_vec());
        store.apply(batch).await.unwrap();
        assert_eq!(store.list_keys("ns").await.unwrap(), vec!["a", "b"]);

        let mut stale = WriteBatch::new();
        stale.guard("ns", "a", None);
        stale.set("ns", "c", b"3".to_vec());
        assert!(matches!(
            store.apply(stale).await,
            Err(StorageError::Conflict { .. })
        ));
        assert!(store.get("ns", "c").await.unwrap().is_none());

        assert_eq!(store.next_sequence("record").await.unwrap(), 1);
        assert_eq!(store.next_sequence("record").await.unwrap(), 2);
        store.close().await.unwrap();
    }
}
