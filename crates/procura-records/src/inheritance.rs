//! Owner-group inheritance along the ownership chain.
//!
//! Children never choose their owner group. On create, the group is copied
//! from the immediate parent, looked up through [`PARENT_TABLE`]. The copy is
//! made once; later changes to the parent's group do not propagate.
//!
//! Parents and link targets are read for update, so a concurrent delete of
//! either turns the child's commit into a conflict.

use procura_core::{EntityType, GroupId, RecordDraft, RecordId, RecordRef};
use procura_storage::Transaction;
use tracing::debug;

use crate::error::{RecordError, RecordResult};
use crate::store::RecordStore;

/// Child type to parent type. Types absent from the table are roots.
pub const PARENT_TABLE: &[(EntityType, EntityType)] = &[
    (EntityType::WorkBreakdown, EntityType::LineItem),
    (EntityType::Asset, EntityType::WorkBreakdown),
    (EntityType::PurchaseOrder, EntityType::Asset),
    (EntityType::GoodsReceipt, EntityType::PurchaseOrder),
    (EntityType::Allocation, EntityType::PurchaseOrder),
];

/// Non-ownership references a type may carry.
pub const LINK_TABLE: &[(EntityType, &[EntityType])] = &[(
    EntityType::LineItem,
    &[EntityType::BusinessCase, EntityType::BudgetItem],
)];

/// The parent type of `child`, or `None` for roots.
#[must_use]
pub fn parent_type(child: EntityType) -> Option<EntityType> {
    PARENT_TABLE
        .iter()
        .find(|(c, _)| *c == child)
        .map(|(_, p)| *p)
}

/// Whether `entity_type` is assigned its owner group directly.
#[must_use]
pub fn is_root(entity_type: EntityType) -> bool {
    parent_type(entity_type).is_none()
}

/// Whether records of `entity_type` carry an owner group at all.
#[must_use]
pub fn has_owner_group(entity_type: EntityType) -> bool {
    entity_type != EntityType::BusinessCase
}

fn allowed_links(entity_type: EntityType) -> &'static [EntityType] {
    LINK_TABLE
        .iter()
        .find(|(ty, _)| *ty == entity_type)
        .map_or(&[], |(_, links)| links)
}

/// What a new child inherits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inherited {
    /// The verified parent.
    pub parent: RecordRef,
    /// Owner group copied from the parent.
    pub owner_group: GroupId,
}

/// Resolves owner groups for records being created.
#[derive(Debug, Clone, Copy, Default)]
pub struct InheritanceResolver {
    records: RecordStore,
}

impl InheritanceResolver {
    /// Create a resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: RecordStore::new(),
        }
    }

    /// The owner group of an existing parent record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::ParentMissing`] if the parent does not exist and
    /// [`RecordError::NoOwnerGroup`] if it has no group to pass on.
    pub async fn resolve_owner_group(
        &self,
        tx: &Transaction,
        parent_type: EntityType,
        parent_id: RecordId,
    ) -> RecordResult<GroupId> {
        let parent = RecordRef::new(parent_type, parent_id);
        let record = self
            .records
            .get(tx, parent_type, parent_id)
            .await?
            .ok_or(RecordError::ParentMissing(parent))?;
        record.owner_group.ok_or(RecordError::NoOwnerGroup(parent))
    }

    /// Resolve the parent and group for a new child of `child_type`.
    ///
    /// Any `owner_group` on the draft is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::ParentNotDeclared`] if the draft names no
    /// parent, or the errors of [`resolve_owner_group`](Self::resolve_owner_group).
    pub async fn inherit(
        &self,
        tx: &mut Transaction,
        child_type: EntityType,
        draft: &RecordDraft,
    ) -> RecordResult<Option<Inherited>> {
        let Some(parent_type) = parent_type(child_type) else {
            return Ok(None);
        };
        let parent_id = draft.parent.ok_or(RecordError::ParentNotDeclared {
            child: child_type,
            parent: parent_type,
        })?;

        let parent = RecordRef::new(parent_type, parent_id);
        let record = self
            .records
            .get_for_update(tx, parent_type, parent_id)
            .await?
            .ok_or(RecordError::ParentMissing(parent))?;
        let owner_group = record.owner_group.ok_or(RecordError::NoOwnerGroup(parent))?;
        if draft.owner_group.is_some_and(|g| g != owner_group) {
            debug!(
                child = %child_type,
                supplied = ?draft.owner_group,
                inherited = %owner_group,
                "Discarding caller-supplied owner group"
            );
        }
        Ok(Some(Inherited {
            parent,
            owner_group,
        }))
    }

    /// Check that every non-ownership link on a draft is allowed for the type
    /// and points at an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidLink`] or [`RecordError::ParentMissing`].
    pub async fn verify_links(
        &self,
        tx: &mut Transaction,
        entity_type: EntityType,
        links: &[RecordRef],
    ) -> RecordResult<()> {
        let allowed = allowed_links(entity_type);
        for link in links {
            if !allowed.contains(&link.entity_type) {
                return Err(RecordError::InvalidLink {
                    entity_type,
                    target: link.entity_type,
                });
            }
            let target = self
                .records
                .get_for_update(tx, link.entity_type, link.id)
                .await?;
            if target.is_none() {
                return Err(RecordError::ParentMissing(*link));
            }
        }
        Ok(())
    }
}
