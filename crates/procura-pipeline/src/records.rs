//! Record mutations: create, update and delete.
//!
//! ```text
//! Authorizing -> [Inheriting] -> Snapshotting -> Mutating -> Auditing -> Committed
//!      \               \                                       \
//!       +---------------+---------------------------------------+--> Rejected
//! ```
//!
//! Each run owns one transaction. The pre-mutation snapshot is read from
//! that transaction with a write guard, so a concurrent change to the same
//! row turns into a commit conflict instead of an audit entry whose
//! `old_state` is stale.

use procura_audit::{AuditAction, AuditEntry};
use procura_core::{
    AccessLevel, Actor, ClientInfo, EntityType, GroupId, OwnedRecord, RecordDraft, RecordId,
    RecordPatch, RecordRef, Timestamp,
};
use procura_grants::GrantError;
use procura_records::{has_owner_group, is_root, parent_type};
use tracing::{Instrument, debug, info};

use crate::engine::{Engine, allowed};
use crate::error::{PipelineError, PipelineResult};
use crate::state::{MutationOutcome, PipelineState, Run};

impl Engine {
    /// Load a record `actor` may read.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] if the actor may not read it (or it
    /// does not exist and the actor is not privileged), or
    /// [`PipelineError::NotFound`] for privileged actors.
    pub async fn get_record(
        &self,
        actor: &Actor,
        entity_type: EntityType,
        id: RecordId,
    ) -> PipelineResult<OwnedRecord> {
        let tx = self.begin();
        allowed(
            self.resolver
                .resolve(&tx, actor, entity_type, id, AccessLevel::Read)
                .await?,
        )?;
        Ok(self.records.require(&tx, entity_type, id).await?)
    }

    /// Create a record.
    ///
    /// Root types take the owner group from the draft, which must name an
    /// existing group. Child types ignore any supplied group and copy their
    /// parent's; the actor needs Write on the parent. Business cases have no
    /// owner group and always start in the draft status.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Denied`] if the actor's role may not create the
    ///   type, or the actor lacks Write on the parent or Read on a link
    /// - [`PipelineError::ParentMissing`] if the parent or a link is absent
    /// - [`PipelineError::InvalidRecord`] for a missing parent id, a
    ///   disallowed link, or a root without a valid owner group
    /// - [`PipelineError::AuditWriteFailed`] if the audit entry cannot be
    ///   staged; nothing is written
    /// - [`PipelineError::Conflict`] if the commit lost a race
    pub async fn create(
        &self,
        actor: &Actor,
        entity_type: EntityType,
        draft: RecordDraft,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<OwnedRecord>> {
        let ctx = Self::context("create", actor, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = self
                .create_steps(&mut run, actor, entity_type, draft, client)
                .await;
            let outcome = run.finish(result).await?;
            info!(record = %outcome.value.record_ref(), "Record created");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    async fn create_steps(
        &self,
        run: &mut Run,
        actor: &Actor,
        entity_type: EntityType,
        draft: RecordDraft,
        client: &ClientInfo,
    ) -> PipelineResult<(OwnedRecord, AuditEntry)> {
        allowed(self.resolver.authorize_create(actor, entity_type))?;

        let (parent, owner_group) = if parent_type(entity_type).is_some() {
            run.enter(PipelineState::Inheriting);
            let inherited = self
                .inheritance
                .inherit(&mut run.tx, entity_type, &draft)
                .await?
                .ok_or_else(|| {
                    PipelineError::InvalidRecord(format!("{entity_type} has no parent type"))
                })?;
            allowed(
                self.resolver
                    .resolve(
                        &run.tx,
                        actor,
                        inherited.parent.entity_type,
                        inherited.parent.id,
                        AccessLevel::Write,
                    )
                    .await?,
            )?;
            (Some(inherited.parent), Some(inherited.owner_group))
        } else {
            (None, self.root_owner_group(run, entity_type, draft.owner_group).await?)
        };

        self.inheritance
            .verify_links(&mut run.tx, entity_type, &draft.links)
            .await?;
        for link in &draft.links {
            allowed(
                self.resolver
                    .resolve(&run.tx, actor, link.entity_type, link.id, AccessLevel::Read)
                    .await?,
            )?;
        }

        let status = if entity_type == EntityType::BusinessCase {
            Some(self.policy().draft_status().to_string())
        } else {
            draft.status
        };
        let id = self.records.allocate_id(&run.tx, entity_type).await?;
        let record = OwnedRecord {
            entity_type,
            id,
            owner_group,
            parent,
            links: draft.links,
            status,
            draft_sealed: false,
            created_by: actor.id,
            updated_by: None,
            created_at: Timestamp::now(),
            updated_at: None,
            fields: draft.fields,
        };

        // Nothing exists yet, so there is nothing to capture.
        run.enter(PipelineState::Snapshotting);
        run.enter(PipelineState::Mutating);
        self.records.insert(&mut run.tx, &record).await?;

        let table = entity_type.table_name();
        let after = Self::capture(table, id.get(), &record)?;
        let entry = self
            .audit(run, AuditAction::Create, (None, Some(after)), actor, client)
            .await?;
        Ok((record, entry))
    }

    async fn root_owner_group(
        &self,
        run: &mut Run,
        entity_type: EntityType,
        supplied: Option<GroupId>,
    ) -> PipelineResult<Option<GroupId>> {
        if !has_owner_group(entity_type) {
            if supplied.is_some() {
                debug!(entity = %entity_type, "Ignoring owner group on a type without one");
            }
            return Ok(None);
        }
        let group = supplied.ok_or_else(|| {
            PipelineError::InvalidRecord(format!("{entity_type} requires an owner group"))
        })?;
        match self.groups.require_for_update(&mut run.tx, group).await {
            Ok(_) => Ok(Some(group)),
            Err(GrantError::GroupNotFound(_)) => Err(PipelineError::InvalidRecord(format!(
                "owner group {group} does not exist"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a patch to a record.
    ///
    /// Requires Write. A status change is authorized without the draft
    /// creator rule, so a business case's creator cannot move it out of
    /// draft alone. Changing the owner group is allowed only on root
    /// records and requires Full.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Denied`] if a check fails
    /// - [`PipelineError::NotFound`] if a privileged actor names an absent
    ///   record
    /// - [`PipelineError::InvalidRecord`] for an owner-group change on a
    ///   child, or to a group that does not exist
    /// - [`PipelineError::AuditWriteFailed`] or [`PipelineError::Conflict`]
    pub async fn update(
        &self,
        actor: &Actor,
        entity_type: EntityType,
        id: RecordId,
        patch: RecordPatch,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<OwnedRecord>> {
        let ctx = Self::context("update", actor, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = self
                .update_steps(&mut run, actor, entity_type, id, &patch, client)
                .await;
            let outcome = run.finish(result).await?;
            info!(record = %outcome.value.record_ref(), "Record updated");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    async fn update_steps(
        &self,
        run: &mut Run,
        actor: &Actor,
        entity_type: EntityType,
        id: RecordId,
        patch: &RecordPatch,
        client: &ClientInfo,
    ) -> PipelineResult<(OwnedRecord, AuditEntry)> {
        let target = RecordRef::new(entity_type, id);
        allowed(
            self.resolver
                .resolve(&run.tx, actor, entity_type, id, AccessLevel::Write)
                .await?,
        )?;
        let before = self
            .records
            .get_for_update(&mut run.tx, entity_type, id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(target.to_string()))?;

        if patch.changes_status_of(&before) {
            allowed(
                self.resolver
                    .resolve_transition(&run.tx, actor, &before, AccessLevel::Write)
                    .await?,
            )?;
        }
        let owner_group = match patch.owner_group {
            Some(group) if Some(group) != before.owner_group => {
                if !is_root(entity_type) || !has_owner_group(entity_type) {
                    return Err(PipelineError::InvalidRecord(format!(
                        "the owner group of {target} is inherited and cannot change"
                    )));
                }
                allowed(
                    self.resolver
                        .resolve_record(&run.tx, actor, &before, AccessLevel::Full)
                        .await?,
                )?;
                match self.groups.require_for_update(&mut run.tx, group).await {
                    Ok(_) => Some(group),
                    Err(GrantError::GroupNotFound(_)) => {
                        return Err(PipelineError::InvalidRecord(format!(
                            "owner group {group} does not exist"
                        )));
                    },
                    Err(e) => return Err(e.into()),
                }
            },
            _ => before.owner_group,
        };

        let table = entity_type.table_name();
        let snapshot = self.snapshot(run, table, id.get(), &before)?;

        run.enter(PipelineState::Mutating);
        let mut after = before.clone();
        patch.apply_to(&mut after, self.policy().draft_status());
        after.owner_group = owner_group;
        after.updated_by = Some(actor.id);
        after.updated_at = Some(Timestamp::now());
        self.records.update(&mut run.tx, &before, &after).await?;

        let captured = Self::capture(table, id.get(), &after)?;
        let entry = self
            .audit(
                run,
                AuditAction::Update,
                (Some(snapshot), Some(captured)),
                actor,
                client,
            )
            .await?;
        Ok((after, entry))
    }

    /// Delete a record. Requires Full.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Denied`] without Full
    /// - [`PipelineError::NotFound`] if a privileged actor names an absent
    ///   record
    /// - [`PipelineError::HasDependents`] while other records reference it
    /// - [`PipelineError::AuditWriteFailed`] or [`PipelineError::Conflict`]
    pub async fn delete(
        &self,
        actor: &Actor,
        entity_type: EntityType,
        id: RecordId,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<OwnedRecord>> {
        let ctx = Self::context("delete", actor, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = self
                .delete_steps(&mut run, actor, entity_type, id, client)
                .await;
            let outcome = run.finish(result).await?;
            info!(record = %outcome.value.record_ref(), "Record deleted");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    async fn delete_steps(
        &self,
        run: &mut Run,
        actor: &Actor,
        entity_type: EntityType,
        id: RecordId,
        client: &ClientInfo,
    ) -> PipelineResult<(OwnedRecord, AuditEntry)> {
        let target = RecordRef::new(entity_type, id);
        allowed(
            self.resolver
                .resolve(&run.tx, actor, entity_type, id, AccessLevel::Full)
                .await?,
        )?;
        let before = self
            .records
            .get_for_update(&mut run.tx, entity_type, id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(target.to_string()))?;

        let table = entity_type.table_name();
        let snapshot = self.snapshot(run, table, id.get(), &before)?;

        run.enter(PipelineState::Mutating);
        let dependents = self.records.referencing_for_update(&mut run.tx, target).await?;
        if !dependents.is_empty() {
            return Err(PipelineError::HasDependents {
                record: target,
                count: dependents.len(),
            });
        }
        self.records.remove(&mut run.tx, &before).await?;

        let entry = self
            .audit(run, AuditAction::Delete, (Some(snapshot), None), actor, client)
            .await?;
        Ok((before, entry))
    }
}
