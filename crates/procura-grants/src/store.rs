//! Grant persistence.
//!
//! | Namespace | Key | Value |
//! |---|---|---|
//! | `grants` | grant id | [`Grant`] JSON |
//! | `grant_targets` | `{table}:{record}` | grant ids on the record |
//! | `grant_subjects` | `actor:{id}` / `group:{id}` | grant ids held |

use std::collections::BTreeSet;

use procura_core::{AccessLevel, ActorId, EntityType, GrantId, GroupId, RecordId, RecordRef, Timestamp};
use procura_storage::Transaction;
use tracing::trace;

use crate::error::{GrantError, GrantResult};
use crate::grant::{Grant, GrantSubject};

const NS_GRANTS: &str = "grants";
const NS_TARGETS: &str = "grant_targets";
const NS_SUBJECTS: &str = "grant_subjects";

fn target_key(target: RecordRef) -> String {
    format!("{}:{}", target.entity_type.table_name(), target.id.storage_key())
}

/// Transactional access to grants.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantStore;

impl GrantStore {
    /// Create a handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Allocate a grant id.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence cannot be advanced.
    pub async fn allocate_id(&self, tx: &Transaction) -> GrantResult<GrantId> {
        Ok(GrantId::new(tx.next_id(NS_GRANTS).await?))
    }

    /// Load a grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the row is corrupt.
    pub async fn get(&self, tx: &Transaction, id: GrantId) -> GrantResult<Option<Grant>> {
        Ok(tx.get_json(NS_GRANTS, &id.storage_key()).await?)
    }

    /// Load a grant that must exist, guarding it for update.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::NotFound`] if it is absent.
    pub async fn require_for_update(&self, tx: &mut Transaction, id: GrantId) -> GrantResult<Grant> {
        tx.get_json_for_update(NS_GRANTS, &id.storage_key())
            .await?
            .ok_or(GrantError::NotFound(id))
    }

    /// Stage a new grant and its index rows.
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    pub async fn insert(&self, tx: &mut Transaction, grant: &Grant) -> GrantResult<()> {
        tx.set_json(NS_GRANTS, &grant.id.storage_key(), grant)?;
        tx.index_insert(NS_TARGETS, &target_key(grant.target()), grant.id)
            .await?;
        tx.index_insert(NS_SUBJECTS, &grant.subject.index_key(), grant.id)
            .await?;
        trace!(grant = %grant.id, target = %grant.target(), "Staged grant");
        Ok(())
    }

    /// Stage an in-place replacement. Target and subject never change, so
    /// the index rows stay as they are.
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    pub fn replace(&self, tx: &mut Transaction, grant: &Grant) -> GrantResult<()> {
        tx.set_json(NS_GRANTS, &grant.id.storage_key(), grant)?;
        Ok(())
    }

    /// Stage removal of a grant and its index rows.
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    pub async fn remove(&self, tx: &mut Transaction, grant: &Grant) -> GrantResult<()> {
        tx.delete(NS_GRANTS, &grant.id.storage_key())?;
        tx.index_remove(NS_TARGETS, &target_key(grant.target()), &grant.id)
            .await?;
        tx.index_remove(NS_SUBJECTS, &grant.subject.index_key(), &grant.id)
            .await?;
        trace!(grant = %grant.id, "Staged grant removal");
        Ok(())
    }

    async fn load_all(
        &self,
        tx: &Transaction,
        ids: BTreeSet<GrantId>,
    ) -> GrantResult<Vec<Grant>> {
        let mut grants = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(grant) = self.get(tx, id).await? {
                grants.push(grant);
            }
        }
        Ok(grants)
    }

    /// Every grant on a record, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if a row cannot be read.
    pub async fn for_target(&self, tx: &Transaction, target: RecordRef) -> GrantResult<Vec<Grant>> {
        let ids = tx.index_members(NS_TARGETS, &target_key(target)).await?;
        self.load_all(tx, ids).await
    }

    /// Every grant held by a subject, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if a row cannot be read.
    pub async fn for_subject(
        &self,
        tx: &Transaction,
        subject: GrantSubject,
    ) -> GrantResult<Vec<Grant>> {
        let ids = tx.index_members(NS_SUBJECTS, &subject.index_key()).await?;
        self.load_all(tx, ids).await
    }

    /// Highest unexpired level granted directly to `actor` on `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if a row cannot be read.
    pub async fn actor_level(
        &self,
        tx: &Transaction,
        target: RecordRef,
        actor: ActorId,
        now: Timestamp,
    ) -> GrantResult<Option<AccessLevel>> {
        Ok(self
            .for_target(tx, target)
            .await?
            .iter()
            .filter(|g| g.subject == GrantSubject::Actor(actor) && g.is_active(now))
            .map(|g| g.access_level)
            .max())
    }

    /// Highest unexpired level granted on `target` to any of `groups`.
    ///
    /// # Errors
    ///
    /// Returns an error if a row cannot be read.
    pub async fn group_level(
        &self,
        tx: &Transaction,
        target: RecordRef,
        groups: &BTreeSet<GroupId>,
        now: Timestamp,
    ) -> GrantResult<Option<AccessLevel>> {
        if groups.is_empty() {
            return Ok(None);
        }
        Ok(self
            .for_target(tx, target)
            .await?
            .iter()
            .filter(|g| g.is_active(now))
            .filter(|g| g.subject.group().is_some_and(|id| groups.contains(&id)))
            .map(|g| g.access_level)
            .max())
    }

    /// Ids of `entity_type` records on which any of `subjects` holds an
    /// unexpired grant.
    ///
    /// # Errors
    ///
    /// Returns an error if a row cannot be read.
    pub async fn granted_ids(
        &self,
        tx: &Transaction,
        subjects: &[GrantSubject],
        entity_type: EntityType,
        now: Timestamp,
    ) -> GrantResult<BTreeSet<RecordId>> {
        let mut ids = BTreeSet::new();
        for subject in subjects {
            for grant in self.for_subject(tx, *subject).await? {
                if grant.entity_type == entity_type && grant.is_active(now) {
                    ids.insert(grant.entity_id);
                }
            }
        }
        Ok(ids)
    }
}
