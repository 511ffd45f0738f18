//! Actor-to-group membership.

use std::collections::BTreeSet;

use procura_core::{ActorId, GroupId, Timestamp};
use procura_storage::Transaction;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{GrantError, GrantResult};

const NS_MEMBERSHIPS: &str = "memberships";
const NS_ACTOR_GROUPS: &str = "actor_groups";
const NS_GROUP_MEMBERS: &str = "group_members";

fn pair_key(group: GroupId, actor: ActorId) -> String {
    format!("{}:{}", group.storage_key(), actor.storage_key())
}

/// One actor's membership in one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Identifier, used as the audit record id.
    pub id: u64,
    /// Member.
    pub actor: ActorId,
    /// Group.
    pub group: GroupId,
    /// Who added the member.
    pub added_by: ActorId,
    /// When.
    pub added_at: Timestamp,
}

/// Membership lookups in both directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipIndex;

impl MembershipIndex {
    /// Create a handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Load one membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn get(
        &self,
        tx: &Transaction,
        group: GroupId,
        actor: ActorId,
    ) -> GrantResult<Option<Membership>> {
        Ok(tx.get_json(NS_MEMBERSHIPS, &pair_key(group, actor)).await?)
    }

    /// Stage a new membership.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::AlreadyMember`] if the pair already exists.
    pub async fn add(
        &self,
        tx: &mut Transaction,
        group: GroupId,
        actor: ActorId,
        added_by: ActorId,
    ) -> GrantResult<Membership> {
        let key = pair_key(group, actor);
        if tx
            .get_json_for_update::<Membership>(NS_MEMBERSHIPS, &key)
            .await?
            .is_some()
        {
            return Err(GrantError::AlreadyMember { actor, group });
        }
        let membership = Membership {
            id: tx.next_id(NS_MEMBERSHIPS).await?,
            actor,
            group,
            added_by,
            added_at: Timestamp::now(),
        };
        tx.set_json(NS_MEMBERSHIPS, &key, &membership)?;
        tx.index_insert(NS_ACTOR_GROUPS, &actor.storage_key(), group)
            .await?;
        tx.index_insert(NS_GROUP_MEMBERS, &group.storage_key(), actor)
            .await?;
        trace!(%actor, %group, "Staged membership");
        Ok(membership)
    }

    /// Stage removal of a membership, returning what was removed.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::NotMember`] if the pair does not exist.
    pub async fn remove(
        &self,
        tx: &mut Transaction,
        group: GroupId,
        actor: ActorId,
    ) -> GrantResult<Membership> {
        let key = pair_key(group, actor);
        let membership: Membership = tx
            .get_json_for_update(NS_MEMBERSHIPS, &key)
            .await?
            .ok_or(GrantError::NotMember { actor, group })?;
        tx.delete(NS_MEMBERSHIPS, &key)?;
        tx.index_remove(NS_ACTOR_GROUPS, &actor.storage_key(), &group)
            .await?;
        tx.index_remove(NS_GROUP_MEMBERS, &group.storage_key(), &actor)
            .await?;
        trace!(%actor, %group, "Staged membership removal");
        Ok(membership)
    }

    /// Groups `actor` belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the index row cannot be read.
    pub async fn groups_of(&self, tx: &Transaction, actor: ActorId) -> GrantResult<BTreeSet<GroupId>> {
        Ok(tx
            .index_members(NS_ACTOR_GROUPS, &actor.storage_key())
            .await?)
    }

    /// Members of `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index row cannot be read.
    pub async fn members_of(&self, tx: &Transaction, group: GroupId) -> GrantResult<BTreeSet<ActorId>> {
        Ok(tx
            .index_members(NS_GROUP_MEMBERS, &group.storage_key())
            .await?)
    }

    /// [`members_of`](Self::members_of), guarded so that a concurrent add or
    /// removal fails this transaction's commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the index row cannot be read.
    pub async fn members_of_for_update(
        &self,
        tx: &mut Transaction,
        group: GroupId,
    ) -> GrantResult<BTreeSet<ActorId>> {
        Ok(tx
            .index_members_for_update(NS_GROUP_MEMBERS, &group.storage_key())
            .await?)
    }

    /// Whether `actor` is in `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn is_member(&self, tx: &Transaction, group: GroupId, actor: ActorId) -> GrantResult<bool> {
        Ok(self.get(tx, group, actor).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use procura_storage::{KvStore, MemoryKvStore};

    use super::*;

    #[tokio::test]
    async fn test_add_remove() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let index = MembershipIndex::new();
        let (g1, g2) = (GroupId::new(1), GroupId::new(2));
        let actor = ActorId::new(10);
        let admin = ActorId::new(1);

        let mut tx = Transaction::begin(Arc::clone(&kv));
        index.add(&mut tx, g1, actor, admin).await.unwrap();
        index.add(&mut tx, g2, actor, admin).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = Transaction::begin(Arc::clone(&kv));
        assert_eq!(
            index.groups_of(&tx, actor).await.unwrap(),
            [g1, g2].into_iter().collect()
        );
        assert!(index.is_member(&tx, g1, actor).await.unwrap());
        assert!(matches!(
            index.add(&mut tx, g1, actor, admin).await,
            Err(GrantError::AlreadyMember { .. })
        ));

        let removed = index.remove(&mut tx, g1, actor).await.unwrap();
        assert_eq!(removed.added_by, admin);
        tx.commit().await.unwrap();

        let mut tx = Transaction::begin(kv);
        assert_eq!(
            index.groups_of(&tx, actor).await.unwrap(),
            [g2].into_iter().collect()
        );
        assert!(index.members_of(&tx, g1).await.unwrap().is_empty());
        assert!(matches!(
            index.remove(&mut tx, g1, actor).await,
            Err(GrantError::NotMember { .. })
        ));
    }
}
