//! Failure-injecting implementations of the storage and audit seams.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use procura_audit::{AuditEntry, AuditError, AuditResult, AuditSink, KvAuditSink, StreamKey};
use procura_crypto::ContentHash;
use procura_storage::{KvStore, StorageError, StorageResult, Transaction, WriteBatch};

/// An [`AuditSink`] that refuses appends once its budget of successful
/// appends is spent. Successful appends go to a [`KvAuditSink`].
#[derive(Debug, Default)]
pub struct FailingAuditSink {
    inner: KvAuditSink,
    allowed: AtomicUsize,
    attempts: AtomicUsize,
}

impl FailingAuditSink {
    /// A sink that refuses every append.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that accepts `n` appends and refuses the rest.
    #[must_use]
    pub fn after(n: usize) -> Self {
        Self {
            allowed: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Number of append calls, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn take_allowance(&self) -> bool {
        self.allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn head(&self, tx: &mut Transaction, stream: &StreamKey) -> AuditResult<ContentHash> {
        self.inner.head(tx, stream).await
    }

    async fn append(&self, tx: &mut Transaction, entry: &AuditEntry) -> AuditResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.take_allowance() {
            self.inner.append(tx, entry).await
        } else {
            Err(AuditError::Storage(StorageError::Internal(
                "audit sink unavailable".to_string(),
            )))
        }
    }
}

/// A [`KvStore`] wrapper whose batch applies can be made to fail.
///
/// Reads and sequence allocation always pass through, so a failure shows up
/// exactly at commit.
#[derive(Clone)]
pub struct FlakyKvStore {
    inner: Arc<dyn KvStore>,
    failing_applies: Arc<AtomicUsize>,
    fail_all: Arc<AtomicBool>,
    applied: Arc<AtomicUsize>,
}

impl std::fmt::Debug for FlakyKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyKvStore")
            .field("failing_applies", &self.failing_applies)
            .field("fail_all", &self.fail_all)
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}

impl FlakyKvStore {
    /// Wrap `inner`. Nothing fails until armed.
    #[must_use]
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            failing_applies: Arc::new(AtomicUsize::new(0)),
            fail_all: Arc::new(AtomicBool::new(false)),
            applied: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next `n` batch applies.
    pub fn fail_next_applies(&self, n: usize) {
        self.failing_applies.store(n, Ordering::SeqCst);
    }

    /// Fail every apply until called again with `false`.
    pub fn set_offline(&self, offline: bool) {
        self.fail_all.store(offline, Ordering::SeqCst);
    }

    /// Batches that reached the inner store.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        self.fail_all.load(Ordering::SeqCst)
            || self
                .failing_applies
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl KvStore for FlakyKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(namespace, key).await
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.inner.set(namespace, key, value).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.inner.delete(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.inner.list_keys(namespace).await
    }

    async fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        if self.should_fail() {
            return Err(StorageError::Connection("injected apply failure".to_string()));
        }
        self.inner.apply(batch).await?;
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn next_sequence(&self, sequence: &str) -> StorageResult<u64> {
        self.inner.next_sequence(sequence).await
    }
}

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type ReadHook = Box<dyn FnOnce() -> HookFuture + Send>;

/// A [`KvStore`] wrapper that runs a one-shot hook right after a chosen key
/// is read.
///
/// The hook runs once the inner read has returned, so the caller sees the
/// value from before the hook. Pointing a second engine at the inner store
/// from the hook interleaves its write between a transaction's read and its
/// commit.
#[derive(Clone)]
pub struct InterleavingKvStore {
    inner: Arc<dyn KvStore>,
    pending: Arc<Mutex<Option<(String, String, ReadHook)>>>,
    fired: Arc<AtomicBool>,
}

impl std::fmt::Debug for InterleavingKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterleavingKvStore")
            .field("fired", &self.fired)
            .finish_non_exhaustive()
    }
}

impl InterleavingKvStore {
    /// Wrap `inner`. No hook is armed.
    #[must_use]
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            pending: Arc::new(Mutex::new(None)),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `hook` after the next read of `namespace`/`key`, replacing any
    /// hook not yet fired.
    pub fn after_read<F, Fut>(&self, namespace: &str, key: &str, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: ReadHook = Box::new(move || -> HookFuture { Box::pin(hook()) });
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((namespace.to_string(), key.to_string(), boxed));
        self.fired.store(false, Ordering::SeqCst);
    }

    /// Whether the armed hook has run.
    #[must_use]
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    fn take_hook(&self, namespace: &str, key: &str) -> Option<ReadHook> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let matches = pending
            .as_ref()
            .is_some_and(|(ns, k, _)| ns == namespace && k == key);
        if matches {
            pending.take().map(|(_, _, hook)| hook)
        } else {
            None
        }
    }
}

#[async_trait]
impl KvStore for InterleavingKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let value = self.inner.get(namespace, key).await?;
        if let Some(hook) = self.take_hook(namespace, key) {
            hook().await;
            self.fired.store(true, Ordering::SeqCst);
        }
        Ok(value)
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.inner.set(namespace, key, value).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.inner.delete(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.inner.list_keys(namespace).await
    }

    async fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        self.inner.apply(batch).await
    }

    async fn next_sequence(&self, sequence: &str) -> StorageResult<u64> {
        self.inner.next_sequence(sequence).await
    }
}
