//! Atomic write batches.
//!
//! A [`WriteBatch`] is the unit a [`KvStore`](crate::KvStore) applies
//! atomically: either every guard holds and every operation lands, or nothing
//! changes. Guards carry the value a transaction observed when it read a key
//! for update; a guard that no longer matches aborts the batch with
//! [`StorageError::Conflict`](crate::StorageError::Conflict).

/// A single staged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or overwrite a value.
    Set {
        /// Target namespace.
        namespace: String,
        /// Target key.
        key: String,
        /// New value.
        value: Vec<u8>,
    },
    /// Remove a key. Removing an absent key is not an error.
    Delete {
        /// Target namespace.
        namespace: String,
        /// Target key.
        key: String,
    },
}

impl WriteOp {
    /// Namespace and key this operation touches.
    #[must_use]
    pub fn target(&self) -> (&str, &str) {
        match self {
            Self::Set { namespace, key, .. } | Self::Delete { namespace, key } => {
                (namespace, key)
            },
        }
    }
}

/// The value a key must still hold for the batch to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadGuard {
    /// Guarded namespace.
    pub namespace: String,
    /// Guarded key.
    pub key: String,
    /// Value observed at read time. `None` means the key was absent.
    pub expected: Option<Vec<u8>>,
}

/// Guards plus operations, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    /// Preconditions checked before any operation is applied.
    pub guards: Vec<ReadGuard>,
    /// Operations in application order.
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a set.
    pub fn set(&mut self, namespace: impl Into<String>, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(WriteOp::Set {
            namespace: namespace.into(),
            key: key.into(),
            value,
        });
    }

    /// Stage a delete.
    pub fn delete(&mut self, namespace: impl Into<String>, key: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            namespace: namespace.into(),
            key: key.into(),
        });
    }

    /// Require `key` to still hold `expected` at apply time.
    pub fn guard(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        expected: Option<Vec<u8>>,
    ) {
        self.guards.push(ReadGuard {
            namespace: namespace.into(),
            key: key.into(),
            expected,
        });
    }

    /// Whether the batch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}
