//! Prelude module - commonly used types for convenient import.
//!
//! Use `use procura_test::prelude::*;` to import all essential types.

// World
pub use crate::{Chain, TestWorld};

// Mocks
pub use crate::{FailingAuditSink, FlakyKvStore, InterleavingKvStore};

// Fixtures
pub use crate::{bootstrap_admin, setup_test_logging, test_client};
