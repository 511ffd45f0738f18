//! Actor and group directories.
//!
//! Actors are provisioned once and never deleted; they can only be
//! deactivated. Group and user names are unique, enforced through a name
//! index read for update so two concurrent creates conflict at commit.

use procura_core::{Actor, ActorId, GroupId, Role, Timestamp};
use procura_storage::Transaction;
use serde::{Deserialize, Serialize};

use crate::error::{GrantError, GrantResult};
use crate::membership::MembershipIndex;

const NS_ACTORS: &str = "actors";
const NS_ACTOR_NAMES: &str = "actor_names";
const NS_GROUPS: &str = "groups";
const NS_GROUP_NAMES: &str = "group_names";

/// A named collection of actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Identifier.
    pub id: GroupId,
    /// Unique name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Creating actor.
    pub created_by: ActorId,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Group lookup and lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupDirectory {
    members: MembershipIndex,
}

impl GroupDirectory {
    /// Create a handle.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            members: MembershipIndex::new(),
        }
    }

    /// Load a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn get(&self, tx: &Transaction, id: GroupId) -> GrantResult<Option<Group>> {
        Ok(tx.get_json(NS_GROUPS, &id.storage_key()).await?)
    }

    /// Load a group that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::GroupNotFound`] if it is absent.
    pub async fn require(&self, tx: &Transaction, id: GroupId) -> GrantResult<Group> {
        self.get(tx, id).await?.ok_or(GrantError::GroupNotFound(id))
    }

    /// Load a group that must exist, guarding it so that a concurrent delete
    /// fails this transaction's commit.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::GroupNotFound`] if it is absent.
    pub async fn require_for_update(&self, tx: &mut Transaction, id: GroupId) -> GrantResult<Group> {
        tx.get_json_for_update(NS_GROUPS, &id.storage_key())
            .await?
            .ok_or(GrantError::GroupNotFound(id))
    }

    /// Stage a new group.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::DuplicateGroup`] if the name is taken.
    pub async fn create(
        &self,
        tx: &mut Transaction,
        name: &str,
        description: Option<String>,
        created_by: ActorId,
    ) -> GrantResult<Group> {
        if tx
            .get_json_for_update::<GroupId>(NS_GROUP_NAMES, name)
            .await?
            .is_some()
        {
            return Err(GrantError::DuplicateGroup(name.to_string()));
        }
        let id = GroupId::new(tx.next_id(NS_GROUPS).await?);
        let group = Group {
            id,
            name: name.to_string(),
            description,
            created_by,
            created_at: Timestamp::now(),
        };
        tx.set_json(NS_GROUPS, &id.storage_key(), &group)?;
        tx.set_json(NS_GROUP_NAMES, name, &id)?;
        Ok(group)
    }

    /// Stage deletion of an empty group, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::GroupNotFound`] or [`GrantError::GroupNotEmpty`].
    pub async fn delete(&self, tx: &mut Transaction, id: GroupId) -> GrantResult<Group> {
        let group = self.require_for_update(tx, id).await?;
        let members = self.members.members_of_for_update(tx, id).await?.len();
        if members > 0 {
            return Err(GrantError::GroupNotEmpty { group: id, members });
        }
        tx.delete(NS_GROUPS, &id.storage_key())?;
        tx.delete(NS_GROUP_NAMES, &group.name)?;
        Ok(group)
    }

    /// Every group, by id.
    ///
    /// # Errors
    ///
    /// Returns an error if a row cannot be read.
    pub async fn list(&self, tx: &Transaction) -> GrantResult<Vec<Group>> {
        let mut groups = Vec::new();
        for key in tx.list_keys(NS_GROUPS).await? {
            if let Some(group) = tx.get_json(NS_GROUPS, &key).await? {
                groups.push(group);
            }
        }
        Ok(groups)
    }
}

/// Actor provisioning and administration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorDirectory;

impl ActorDirectory {
    /// Create a handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Load an actor.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn get(&self, tx: &Transaction, id: ActorId) -> GrantResult<Option<Actor>> {
        Ok(tx.get_json(NS_ACTORS, &id.storage_key()).await?)
    }

    /// Load an actor that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::ActorNotFound`] if it is absent.
    pub async fn require(&self, tx: &Transaction, id: ActorId) -> GrantResult<Actor> {
        self.get(tx, id).await?.ok_or(GrantError::ActorNotFound(id))
    }

    /// Stage a new active actor.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::DuplicateActor`] if the username is taken.
    pub async fn provision(
        &self,
        tx: &mut Transaction,
        username: &str,
        role: Role,
    ) -> GrantResult<Actor> {
        if tx
            .get_json_for_update::<ActorId>(NS_ACTOR_NAMES, username)
            .await?
            .is_some()
        {
            return Err(GrantError::DuplicateActor(username.to_string()));
        }
        let id = ActorId::new(tx.next_id(NS_ACTORS).await?);
        let actor = Actor::new(id, username, role);
        tx.set_json(NS_ACTORS, &id.storage_key(), &actor)?;
        tx.set_json(NS_ACTOR_NAMES, username, &id)?;
        Ok(actor)
    }

    /// Stage a change to an actor, returning `(before, after)`.
    async fn modify(
        &self,
        tx: &mut Transaction,
        id: ActorId,
        change: impl FnOnce(&mut Actor),
    ) -> GrantResult<(Actor, Actor)> {
        let before: Actor = tx
            .get_json_for_update(NS_ACTORS, &id.storage_key())
            .await?
            .ok_or(GrantError::ActorNotFound(id))?;
        let mut after = before.clone();
        change(&mut after);
        tx.set_json(NS_ACTORS, &id.storage_key(), &after)?;
        Ok((before, after))
    }

    /// Stage a role change.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::ActorNotFound`] if the actor is absent.
    pub async fn set_role(
        &self,
        tx: &mut Transaction,
        id: ActorId,
        role: Role,
    ) -> GrantResult<(Actor, Actor)> {
        self.modify(tx, id, |a| a.role = role).await
    }

    /// Stage deactivation.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::ActorNotFound`] if the actor is absent.
    pub async fn deactivate(&self, tx: &mut Transaction, id: ActorId) -> GrantResult<(Actor, Actor)> {
        self.modify(tx, id, |a| a.active = false).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use procura_storage::{KvStore, MemoryKvStore};

    use super::*;

    #[tokio::test]
    async fn test_group_names_are_unique() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let groups = GroupDirectory::new();
        let mut tx = Transaction::begin(Arc::clone(&kv));
        let g = groups
            .create(&mut tx, "finance", None, ActorId::new(1))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = Transaction::begin(kv);
        assert!(matches!(
            groups.create(&mut tx, "finance", None, ActorId::new(1)).await,
            Err(GrantError::DuplicateGroup(_))
        ));
        assert_eq!(groups.require(&tx, g.id).await.unwrap().name, "finance");
    }

    #[tokio::test]
    async fn test_delete_blocked_by_members() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let groups = GroupDirectory::new();
        let members = MembershipIndex::new();
        let admin = ActorId::new(1);

        let mut tx = Transaction::begin(kv);
        let g = groups.create(&mut tx, "ops", None, admin).await.unwrap();
        members.add(&mut tx, g.id, ActorId::new(2), admin).await.unwrap();
        assert!(matches!(
            groups.delete(&mut tx, g.id).await,
            Err(GrantError::GroupNotEmpty { members: 1, .. })
        ));

        members.remove(&mut tx, g.id, ActorId::new(2)).await.unwrap();
        groups.delete(&mut tx, g.id).await.unwrap();
        assert!(groups.get(&tx, g.id).await.unwrap().is_none());
        // Name is free again.
        groups.create(&mut tx, "ops", None, admin).await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_lifecycle() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let actors = ActorDirectory::new();
        let mut tx = Transaction::begin(kv);

        let alice = actors.provision(&mut tx, "alice", Role::User).await.unwrap();
        assert!(matches!(
            actors.provision(&mut tx, "alice", Role::Viewer).await,
            Err(GrantError::DuplicateActor(_))
        ));

        let (before, after) = actors.set_role(&mut tx, alice.id, Role::Manager).await.unwrap();
        assert_eq!(before.role, Role::User);
        assert_eq!(after.role, Role::Manager);

        let (_, after) = actors.deactivate(&mut tx, alice.id).await.unwrap();
        assert!(!after.active);
        assert!(!actors.require(&tx, alice.id).await.unwrap().active);
    }
}
