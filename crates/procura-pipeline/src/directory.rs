//! Actor and group administration.
//!
//! | Operation | Role | Audit table |
//! |---|---|---|
//! | provision, role change, deactivation | Admin | `user` |
//! | group create/delete | Manager | `user_group` |
//! | membership add/remove | Manager | `user_group_membership` |

use procura_audit::{AuditAction, AuditEntry};
use procura_core::{Actor, ActorId, ClientInfo, GroupId, Role};
use procura_grants::{GrantError, Group, Membership};
use tracing::{Instrument, info};

use crate::engine::{Engine, require_role};
use crate::error::{PipelineError, PipelineResult};
use crate::state::{MutationOutcome, PipelineState, Run};

/// Audit table for actors.
pub const ACTOR_TABLE: &str = "user";
/// Audit table for groups.
pub const GROUP_TABLE: &str = "user_group";
/// Audit table for memberships.
pub const MEMBERSHIP_TABLE: &str = "user_group_membership";

impl Engine {
    /// The stored state of an actor.
    ///
    /// Checks trust the [`Actor`] they are handed, so callers load it here
    /// at the start of each request to see deactivations and role changes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] for an unknown actor.
    pub async fn load_actor(&self, id: ActorId) -> PipelineResult<Actor> {
        let tx = self.begin();
        Ok(self.actors.require(&tx, id).await?)
    }

    /// Create an active actor. Requires Admin.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Admin,
    /// [`PipelineError::InvalidRequest`] for a taken username, or the
    /// audit and commit errors.
    pub async fn provision_actor(
        &self,
        admin: &Actor,
        username: &str,
        role: Role,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Actor>> {
        let ctx = Self::context("provision_actor", admin, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = async {
                require_role(admin, Role::Admin, "provision actors")?;
                run.enter(PipelineState::Snapshotting);
                run.enter(PipelineState::Mutating);
                let actor = self.actors.provision(&mut run.tx, username, role).await?;
                let after = Self::capture(ACTOR_TABLE, actor.id.get(), &actor)?;
                let entry = self
                    .audit(&mut run, AuditAction::Create, (None, Some(after)), admin, client)
                    .await?;
                Ok((actor, entry))
            }
            .await;
            let outcome = run.finish(result).await?;
            info!(actor = %outcome.value.id, role = %role, "Actor provisioned");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    /// Change an actor's role. Requires Admin.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Admin,
    /// [`PipelineError::NotFound`] for an unknown actor, or the audit and
    /// commit errors.
    pub async fn set_role(
        &self,
        admin: &Actor,
        target: ActorId,
        role: Role,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Actor>> {
        let ctx = Self::context("set_role", admin, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = async {
                require_role(admin, Role::Admin, "change roles")?;
                let (before, after) = self.actors.set_role(&mut run.tx, target, role).await?;
                self.audit_actor_change(&mut run, admin, before, after, client)
                    .await
            }
            .await;
            let outcome = run.finish(result).await?;
            info!(actor = %target, role = %role, "Role changed");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    /// Deactivate an actor. Deactivated actors are denied every check.
    /// Requires Admin; an admin cannot deactivate themselves.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Admin,
    /// [`PipelineError::InvalidRequest`] for self-deactivation,
    /// [`PipelineError::NotFound`] for an unknown actor, or the audit and
    /// commit errors.
    pub async fn deactivate_actor(
        &self,
        admin: &Actor,
        target: ActorId,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Actor>> {
        let ctx = Self::context("deactivate_actor", admin, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = async {
                require_role(admin, Role::Admin, "deactivate actors")?;
                if target == admin.id {
                    return Err(PipelineError::InvalidRequest(
                        "an actor cannot deactivate themselves".to_string(),
                    ));
                }
                let (before, after) = self.actors.deactivate(&mut run.tx, target).await?;
                self.audit_actor_change(&mut run, admin, before, after, client)
                    .await
            }
            .await;
            let outcome = run.finish(result).await?;
            info!(actor = %target, "Actor deactivated");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    async fn audit_actor_change(
        &self,
        run: &mut Run,
        admin: &Actor,
        before: Actor,
        after: Actor,
        client: &ClientInfo,
    ) -> PipelineResult<(Actor, AuditEntry)> {
        let id = before.id.get();
        let snapshot = self.snapshot(run, ACTOR_TABLE, id, &before)?;
        run.enter(PipelineState::Mutating);
        let captured = Self::capture(ACTOR_TABLE, id, &after)?;
        let entry = self
            .audit(
                run,
                AuditAction::Update,
                (Some(snapshot), Some(captured)),
                admin,
                client,
            )
            .await?;
        Ok((after, entry))
    }

    /// Create a group. Requires Manager.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Manager,
    /// [`PipelineError::InvalidRequest`] for a taken name, or the audit and
    /// commit errors.
    pub async fn create_group(
        &self,
        manager: &Actor,
        name: &str,
        description: Option<String>,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Group>> {
        let ctx = Self::context("create_group", manager, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = async {
                require_role(manager, Role::Manager, "create groups")?;
                run.enter(PipelineState::Snapshotting);
                run.enter(PipelineState::Mutating);
                let group = self
                    .groups
                    .create(&mut run.tx, name, description, manager.id)
                    .await?;
                let after = Self::capture(GROUP_TABLE, group.id.get(), &group)?;
                let entry = self
                    .audit(&mut run, AuditAction::Create, (None, Some(after)), manager, client)
                    .await?;
                Ok((group, entry))
            }
            .await;
            let outcome = run.finish(result).await?;
            info!(group = %outcome.value.id, name = %outcome.value.name, "Group created");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    /// Delete an empty group. Requires Manager.
    ///
    /// Records owned by the group keep its id; nobody reaches them through
    /// owner-group membership any more.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Manager,
    /// [`PipelineError::NotFound`] for an unknown group,
    /// [`PipelineError::InvalidRequest`] while it has members, or the audit
    /// and commit errors.
    pub async fn delete_group(
        &self,
        manager: &Actor,
        group: GroupId,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Group>> {
        let ctx = Self::context("delete_group", manager, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = async {
                require_role(manager, Role::Manager, "delete groups")?;
                let existing = self.groups.require_for_update(&mut run.tx, group).await?;
                let snapshot = self.snapshot(&mut run, GROUP_TABLE, group.get(), &existing)?;
                run.enter(PipelineState::Mutating);
                let removed = self.groups.delete(&mut run.tx, group).await?;
                let entry = self
                    .audit(&mut run, AuditAction::Delete, (Some(snapshot), None), manager, client)
                    .await?;
                Ok((removed, entry))
            }
            .await;
            let outcome = run.finish(result).await?;
            info!(%group, "Group deleted");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    /// Add an actor to a group. Requires Manager.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Manager,
    /// [`PipelineError::NotFound`] for an unknown group or actor,
    /// [`PipelineError::InvalidRequest`] if already a member, or the audit
    /// and commit errors.
    pub async fn add_member(
        &self,
        manager: &Actor,
        group: GroupId,
        actor: ActorId,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Membership>> {
        let ctx = Self::context("add_member", manager, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = async {
                require_role(manager, Role::Manager, "change group membership")?;
                self.groups.require_for_update(&mut run.tx, group).await?;
                self.actors.require(&run.tx, actor).await?;
                run.enter(PipelineState::Snapshotting);
                run.enter(PipelineState::Mutating);
                let membership = self
                    .members
                    .add(&mut run.tx, group, actor, manager.id)
                    .await?;
                let after = Self::capture(MEMBERSHIP_TABLE, membership.id, &membership)?;
                let entry = self
                    .audit(&mut run, AuditAction::Create, (None, Some(after)), manager, client)
                    .await?;
                Ok((membership, entry))
            }
            .await;
            let outcome = run.finish(result).await?;
            info!(%group, %actor, "Member added");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    /// Remove an actor from a group. Requires Manager.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Manager,
    /// [`PipelineError::InvalidRequest`] if not a member, or the audit and
    /// commit errors.
    pub async fn remove_member(
        &self,
        manager: &Actor,
        group: GroupId,
        actor: ActorId,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Membership>> {
        let ctx = Self::context("remove_member", manager, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = async {
                require_role(manager, Role::Manager, "change group membership")?;
                let existing = self
                    .members
                    .get(&run.tx, group, actor)
                    .await?
                    .ok_or(GrantError::NotMember { actor, group })?;
                let snapshot =
                    self.snapshot(&mut run, MEMBERSHIP_TABLE, existing.id, &existing)?;
                run.enter(PipelineState::Mutating);
                let removed = self.members.remove(&mut run.tx, group, actor).await?;
                let entry = self
                    .audit(&mut run, AuditAction::Delete, (Some(snapshot), None), manager, client)
                    .await?;
                Ok((removed, entry))
            }
            .await;
            let outcome = run.finish(result).await?;
            info!(%group, %actor, "Member removed");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use procura_access::PolicyTable;
    use procura_core::{AccessLevel, EntityType, RecordDraft};
    use procura_crypto::KeyPair;
    use procura_storage::MemoryKvStore;

    use super::*;

    fn engine() -> Engine {
        Engine::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(KeyPair::generate()),
            PolicyTable::default(),
        )
    }

    fn bootstrap() -> Actor {
        Actor::new(ActorId::new(0), "bootstrap", Role::Admin)
    }

    #[tokio::test]
    async fn test_role_gates() {
        let engine = engine();
        let client = ClientInfo::default();
        let admin = engine
            .provision_actor(&bootstrap(), "admin", Role::Admin, &client)
            .await
            .unwrap()
            .value;
        let manager = engine
            .provision_actor(&admin, "mia", Role::Manager, &client)
            .await
            .unwrap()
            .value;
        let user = engine
            .provision_actor(&admin, "uma", Role::User, &client)
            .await
            .unwrap()
            .value;

        assert!(
            engine
                .provision_actor(&manager, "x", Role::User, &client)
                .await
                .unwrap_err()
                .is_denied()
        );
        assert!(
            engine
                .create_group(&user, "g", None, &client)
                .await
                .unwrap_err()
                .is_denied()
        );
        let group = engine
            .create_group(&manager, "g", None, &client)
            .await
            .unwrap();
        assert_eq!(group.entry.table_name, GROUP_TABLE);
    }

    #[tokio::test]
    async fn test_membership_changes_are_audited() {
        let engine = engine();
        let client = ClientInfo::from_ip("203.0.113.9");
        let admin = engine
            .provision_actor(&bootstrap(), "admin", Role::Admin, &client)
            .await
            .unwrap()
            .value;
        let user = engine
            .provision_actor(&admin, "ulf", Role::User, &client)
            .await
            .unwrap()
            .value;
        let group = engine
            .create_group(&admin, "plant", None, &client)
            .await
            .unwrap()
            .value
            .id;

        let added = engine.add_member(&admin, group, user.id, &client).await.unwrap();
        assert_eq!(added.entry.table_name, MEMBERSHIP_TABLE);
        assert!(matches!(
            engine.add_member(&admin, group, user.id, &client).await,
            Err(PipelineError::InvalidRequest(_))
        ));
        assert!(matches!(
            engine.delete_group(&admin, group, &client).await,
            Err(PipelineError::InvalidRequest(_))
        ));

        let removed = engine
            .remove_member(&admin, group, user.id, &client)
            .await
            .unwrap();
        assert_eq!(removed.entry.record_id, added.entry.record_id);
        assert!(removed.entry.follows(&added.entry));

        engine.delete_group(&admin, group, &client).await.unwrap();
        let history = engine
            .audit_history(&admin, GROUP_TABLE, group.get())
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_deactivated_actor_loses_access() {
        let engine = engine();
        let client = ClientInfo::default();
        let admin = engine
            .provision_actor(&bootstrap(), "admin", Role::Admin, &client)
            .await
            .unwrap()
            .value;
        let user = engine
            .provision_actor(&admin, "una", Role::User, &client)
            .await
            .unwrap()
            .value;
        let case = engine
            .create(&user, EntityType::BusinessCase, RecordDraft::new(), &client)
            .await
            .unwrap()
            .value;
        assert_eq!(case.status.as_deref(), Some("Draft"));

        assert!(matches!(
            engine.deactivate_actor(&admin, admin.id, &client).await,
            Err(PipelineError::InvalidRequest(_))
        ));
        let deactivated = engine
            .deactivate_actor(&admin, user.id, &client)
            .await
            .unwrap();
        assert!(!deactivated.value.active);
        assert_eq!(deactivated.entry.table_name, ACTOR_TABLE);

        let decision = engine
            .check_access(&deactivated.value, EntityType::BusinessCase, case.id, AccessLevel::Read)
            .await
            .unwrap();
        assert!(!decision.is_allowed());

        // A copy taken before deactivation is stale; reloading picks it up.
        let reloaded = engine.load_actor(user.id).await.unwrap();
        assert_eq!(reloaded, deactivated.value);
        assert!(
            engine
                .get_record(&reloaded, EntityType::BusinessCase, case.id)
                .await
                .unwrap_err()
                .is_denied()
        );
        assert!(matches!(
            engine.load_actor(ActorId::new(999)).await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_role_records_before_and_after() {
        let engine = engine();
        let client = ClientInfo::default();
        let admin = engine
            .provision_actor(&bootstrap(), "admin", Role::Admin, &client)
            .await
            .unwrap()
            .value;
        let user = engine
            .provision_actor(&admin, "ugo", Role::User, &client)
            .await
            .unwrap()
            .value;
        let promoted = engine
            .set_role(&admin, user.id, Role::Manager, &client)
            .await
            .unwrap();
        assert_eq!(promoted.value.role, Role::Manager);
        let old = promoted.entry.old_state.unwrap();
        assert_eq!(old["role"], serde_json::json!("User"));
    }
}
