//! A seeded engine for scenario tests.

use std::sync::Arc;

use procura_access::PolicyTable;
use procura_audit::AuditEntry;
use procura_core::{Actor, ClientInfo, EntityType, GroupId, OwnedRecord, RecordDraft, Role};
use procura_crypto::KeyPair;
use procura_pipeline::{Engine, PipelineResult};
use procura_storage::{KvStore, MemoryKvStore, StorageError, StorageResult};

use crate::fixtures::{bootstrap_admin, child_draft, owned_draft, test_client};

/// Namespace the audit sink keeps entries in, keyed by entry id.
const AUDIT_ENTRIES: &str = "audit_entries";

/// An engine over a fresh store with one provisioned admin.
pub struct TestWorld {
    /// The engine under test.
    pub engine: Engine,
    /// The store underneath it, for direct inspection.
    pub store: Arc<dyn KvStore>,
    /// A provisioned admin.
    pub admin: Actor,
    /// Client metadata attached to every fixture call.
    pub client: ClientInfo,
}

impl std::fmt::Debug for TestWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestWorld")
            .field("engine", &self.engine)
            .field("admin", &self.admin)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

/// A full ownership chain, top first.
#[derive(Debug, Clone)]
pub struct Chain {
    /// The root.
    pub line_item: OwnedRecord,
    /// Child of the line item.
    pub work_breakdown: OwnedRecord,
    /// Child of the work breakdown.
    pub asset: OwnedRecord,
    /// Child of the asset.
    pub purchase_order: OwnedRecord,
}

impl TestWorld {
    /// A world over an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the admin cannot be provisioned.
    pub async fn new() -> PipelineResult<Self> {
        Self::with_store(Arc::new(MemoryKvStore::new()), |e| e).await
    }

    /// A world over `store`, with `configure` applied to the engine before
    /// any actor is provisioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the admin cannot be provisioned.
    pub async fn with_store(
        store: Arc<dyn KvStore>,
        configure: impl FnOnce(Engine) -> Engine,
    ) -> PipelineResult<Self> {
        let engine = configure(Engine::new(
            Arc::clone(&store),
            Arc::new(KeyPair::generate()),
            PolicyTable::default(),
        ));
        let client = test_client();
        let admin = engine
            .provision_actor(&bootstrap_admin(), "admin", Role::Admin, &client)
            .await?
            .value;
        Ok(Self {
            engine,
            store,
            admin,
            client,
        })
    }

    /// Provision an actor.
    ///
    /// # Errors
    ///
    /// Returns an error if the username is taken.
    pub async fn actor(&self, username: &str, role: Role) -> PipelineResult<Actor> {
        Ok(self
            .engine
            .provision_actor(&self.admin, username, role, &self.client)
            .await?
            .value)
    }

    /// Create a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken.
    pub async fn group(&self, name: &str) -> PipelineResult<GroupId> {
        Ok(self
            .engine
            .create_group(&self.admin, name, None, &self.client)
            .await?
            .value
            .id)
    }

    /// Add `actor` to `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if either is unknown or the actor is already a
    /// member.
    pub async fn join(&self, group: GroupId, actor: &Actor) -> PipelineResult<()> {
        self.engine
            .add_member(&self.admin, group, actor.id, &self.client)
            .await?;
        Ok(())
    }

    /// Provision an actor and add them to `group`.
    ///
    /// # Errors
    ///
    /// See [`actor`](Self::actor) and [`join`](Self::join).
    pub async fn member(&self, username: &str, role: Role, group: GroupId) -> PipelineResult<Actor> {
        let actor = self.actor(username, role).await?;
        self.join(group, &actor).await?;
        Ok(actor)
    }

    /// Create a record as `actor`.
    ///
    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn create(
        &self,
        actor: &Actor,
        entity_type: EntityType,
        draft: RecordDraft,
    ) -> PipelineResult<OwnedRecord> {
        Ok(self
            .engine
            .create(actor, entity_type, draft, &self.client)
            .await?
            .value)
    }

    /// Build LineItem -> WorkBreakdown -> Asset -> PurchaseOrder owned by
    /// `group`, created by `actor`.
    ///
    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn chain(&self, actor: &Actor, group: GroupId) -> PipelineResult<Chain> {
        let line_item = self
            .create(actor, EntityType::LineItem, owned_draft(group))
            .await?;
        let work_breakdown = self
            .create(actor, EntityType::WorkBreakdown, child_draft(line_item.id))
            .await?;
        let asset = self
            .create(actor, EntityType::Asset, child_draft(work_breakdown.id))
            .await?;
        let purchase_order = self
            .create(actor, EntityType::PurchaseOrder, child_draft(asset.id))
            .await?;
        Ok(Chain {
            line_item,
            work_breakdown,
            asset,
            purchase_order,
        })
    }

    /// Rewrite a stored audit entry behind the engine's back.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the entry is not stored, or a
    /// serialization error.
    pub async fn tamper_entry(
        &self,
        entry: &AuditEntry,
        edit: impl FnOnce(&mut serde_json::Value),
    ) -> StorageResult<()> {
        let key = entry.id.to_string();
        let bytes = self
            .store
            .get(AUDIT_ENTRIES, &key)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("{AUDIT_ENTRIES}/{key}")))?;
        let mut value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        edit(&mut value);
        let bytes =
            serde_json::to_vec(&value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.set(AUDIT_ENTRIES, &key, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chain_shares_the_root_group() {
        let world = TestWorld::new().await.unwrap();
        let group = world.group("plant").await.unwrap();
        let chain = world.chain(&world.admin, group).await.unwrap();
        for record in [&chain.work_breakdown, &chain.asset, &chain.purchase_order] {
            assert_eq!(record.owner_group, Some(group));
        }
    }

    #[tokio::test]
    async fn test_tamper_missing_entry() {
        let world = TestWorld::new().await.unwrap();
        let group = world.group("g").await.unwrap();
        let history = world
            .engine
            .audit_history(&world.admin, procura_pipeline::GROUP_TABLE, group.get())
            .await
            .unwrap();
        world.tamper_entry(&history[0], |_| {}).await.unwrap();
        world.store.delete(AUDIT_ENTRIES, &history[0].id.to_string()).await.unwrap();
        assert!(matches!(
            world.tamper_entry(&history[0], |_| {}).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
