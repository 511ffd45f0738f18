//! Test fixtures for common types.

use procura_core::{Actor, ActorId, ClientInfo, GroupId, RecordDraft, RecordId};
use tracing_subscriber::EnvFilter;

/// An admin that exists only in memory, used to provision the first real
/// actors of a fresh store.
#[must_use]
pub fn bootstrap_admin() -> Actor {
    Actor::new(ActorId::new(0), "bootstrap", procura_core::Role::Admin)
}

/// Client metadata from a documentation address.
#[must_use]
pub fn test_client() -> ClientInfo {
    ClientInfo::from_ip("192.0.2.10")
}

/// A root draft owned by `group`.
#[must_use]
pub fn owned_draft(group: GroupId) -> RecordDraft {
    RecordDraft::new()
        .with_owner_group(group)
        .with_field("title", "fixture")
}

/// A child draft under `parent`.
#[must_use]
pub fn child_draft(parent: RecordId) -> RecordDraft {
    RecordDraft::new()
        .with_parent(parent)
        .with_field("title", "fixture")
}

/// A business case draft.
#[must_use]
pub fn business_case_draft(title: &str) -> RecordDraft {
    RecordDraft::new()
        .with_field("title", title)
        .with_field("amount", 125_000)
}

/// Route `tracing` output to the test writer. Safe to call repeatedly.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}
