//! Procura Storage - Namespaced key-value storage with atomic transactions.
//!
//! This crate provides:
//! - [`KvStore`], a byte-level namespaced store with atomic batch apply
//! - [`MemoryKvStore`] for tests and ephemeral use
//! - `SurrealKvStore` (feature `kv`) for persistent, ACID storage
//! - [`Transaction`], request-scoped read-your-writes with commit-time
//!   conflict detection
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use procura_storage::{KvStore, MemoryKvStore, Transaction};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
//!     let mut tx = Transaction::begin(Arc::clone(&store));
//!     tx.set("records", "1", b"{}".to_vec()).unwrap();
//!     tx.commit().await.unwrap();
//!     assert!(store.exists("records", "1").await.unwrap());
//! });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod batch;
mod error;
mod kv;
mod transaction;

pub use batch::{ReadGuard, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;
pub use kv::{KvStore, MemoryKvStore};
pub use transaction::Transaction;
