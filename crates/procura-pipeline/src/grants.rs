//! Grant mutations, audited under the `record_access` table.
//!
//! Every grant mutation requires Full on the target record. Non-privileged
//! actors may only change or revoke grants they issued themselves.

use procura_audit::{AuditAction, AuditEntry};
use procura_core::{AccessLevel, Actor, ClientInfo, GrantId, RecordRef, Role};
use procura_grants::{Grant, GrantError, GrantRequest, GrantSubject, GrantUpdate};
use tracing::{Instrument, info};

use crate::engine::{Engine, allowed};
use crate::error::{PipelineError, PipelineResult};
use crate::state::{MutationOutcome, PipelineState, Run};

/// Audit table for grants.
pub const GRANT_TABLE: &str = "record_access";

impl Engine {
    /// Every grant on `target`, expired ones included. Requires Full on the
    /// target.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] without Full.
    pub async fn grants_for(&self, actor: &Actor, target: RecordRef) -> PipelineResult<Vec<Grant>> {
        let tx = self.begin();
        allowed(
            self.resolver
                .resolve(&tx, actor, target.entity_type, target.id, AccessLevel::Full)
                .await?,
        )?;
        Ok(self.grants.for_target(&tx, target).await?)
    }

    /// Share a record with an actor or a group.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidGrantShape`] unless exactly one of
    ///   `user_id` and `group_id` is set; checked before anything else
    /// - [`PipelineError::Denied`] without Full on the target
    /// - [`PipelineError::NotFound`] if the target or grantee does not exist
    /// - [`PipelineError::InvalidRequest`] for a Write or Full grant to a
    ///   Viewer
    /// - [`PipelineError::AuditWriteFailed`] or [`PipelineError::Conflict`]
    pub async fn create_grant(
        &self,
        actor: &Actor,
        request: GrantRequest,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Grant>> {
        let ctx = Self::context("create_grant", actor, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = self.create_grant_steps(&mut run, actor, &request, client).await;
            let outcome = run.finish(result).await?;
            info!(
                grant = %outcome.value.id,
                target = %outcome.value.target(),
                subject = %outcome.value.subject,
                level = %outcome.value.access_level,
                "Grant created"
            );
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    async fn create_grant_steps(
        &self,
        run: &mut Run,
        actor: &Actor,
        request: &GrantRequest,
        client: &ClientInfo,
    ) -> PipelineResult<(Grant, AuditEntry)> {
        let subject = request.subject()?;
        let target = request.target();
        allowed(
            self.resolver
                .resolve(&run.tx, actor, target.entity_type, target.id, AccessLevel::Full)
                .await?,
        )?;
        if !self.records.exists(&run.tx, target).await? {
            return Err(PipelineError::NotFound(target.to_string()));
        }
        self.check_grantee(run, subject, request.access_level).await?;

        run.enter(PipelineState::Snapshotting);
        run.enter(PipelineState::Mutating);
        let id = self.grants.allocate_id(&run.tx).await?;
        let grant = Grant::from_request(id, request, actor.id)?;
        self.grants.insert(&mut run.tx, &grant).await?;

        let after = Self::capture(GRANT_TABLE, id.get(), &grant)?;
        let entry = self
            .audit(run, AuditAction::Create, (None, Some(after)), actor, client)
            .await?;
        Ok((grant, entry))
    }

    async fn check_grantee(
        &self,
        run: &Run,
        subject: GrantSubject,
        level: AccessLevel,
    ) -> PipelineResult<()> {
        match subject {
            GrantSubject::Actor(id) => {
                let grantee = self.actors.require(&run.tx, id).await?;
                if grantee.role == Role::Viewer && level > AccessLevel::Read {
                    return Err(GrantError::ViewerLevel { actor: id, level }.into());
                }
            },
            GrantSubject::Group(id) => {
                self.groups.require(&run.tx, id).await?;
            },
        }
        Ok(())
    }

    /// Load a grant for modification and check the actor may change it.
    async fn authorize_grant_change(
        &self,
        run: &mut Run,
        actor: &Actor,
        id: GrantId,
    ) -> PipelineResult<Grant> {
        let grant = self.grants.require_for_update(&mut run.tx, id).await?;
        let target = grant.target();
        allowed(
            self.resolver
                .resolve(&run.tx, actor, target.entity_type, target.id, AccessLevel::Full)
                .await?,
        )?;
        if !actor.is_privileged() && grant.granted_by != actor.id {
            return Err(PipelineError::Denied {
                reason: format!("{} did not issue {id}", actor.id),
            });
        }
        Ok(grant)
    }

    /// Change a grant's level or expiry.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotFound`] if the grant does not exist
    /// - [`PipelineError::Denied`] without Full on the target, or if a
    ///   non-privileged actor did not issue the grant
    /// - [`PipelineError::InvalidRequest`] for raising a Viewer above Read
    /// - [`PipelineError::AuditWriteFailed`] or [`PipelineError::Conflict`]
    pub async fn update_grant(
        &self,
        actor: &Actor,
        id: GrantId,
        update: GrantUpdate,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Grant>> {
        let ctx = Self::context("update_grant", actor, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = self
                .update_grant_steps(&mut run, actor, id, &update, client)
                .await;
            let outcome = run.finish(result).await?;
            info!(grant = %id, level = %outcome.value.access_level, "Grant updated");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    async fn update_grant_steps(
        &self,
        run: &mut Run,
        actor: &Actor,
        id: GrantId,
        update: &GrantUpdate,
        client: &ClientInfo,
    ) -> PipelineResult<(Grant, AuditEntry)> {
        let before = self.authorize_grant_change(run, actor, id).await?;
        if let Some(level) = update.access_level {
            self.check_grantee(run, before.subject, level).await?;
        }

        let snapshot = self.snapshot(run, GRANT_TABLE, id.get(), &before)?;
        run.enter(PipelineState::Mutating);
        let mut after = before.clone();
        after.apply(update, actor.id);
        self.grants.replace(&mut run.tx, &after)?;

        let captured = Self::capture(GRANT_TABLE, id.get(), &after)?;
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

    /// Revoke a grant. Affects later checks only; earlier audit entries
    /// stay as they are.
    ///
    /// # Errors
    ///
    /// Same as [`update_grant`](Self::update_grant), minus the Viewer check.
    pub async fn revoke_grant(
        &self,
        actor: &Actor,
        id: GrantId,
        client: &ClientInfo,
    ) -> PipelineResult<MutationOutcome<Grant>> {
        let ctx = Self::context("revoke_grant", actor, client);
        async {
            let mut run = Run::begin(&self.store);
            let result = self.revoke_grant_steps(&mut run, actor, id, client).await;
            let outcome = run.finish(result).await?;
            info!(grant = %id, target = %outcome.value.target(), "Grant revoked");
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(ctx.span())
        .await
    }

    async fn revoke_grant_steps(
        &self,
        run: &mut Run,
        actor: &Actor,
        id: GrantId,
        client: &ClientInfo,
    ) -> PipelineResult<(Grant, AuditEntry)> {
        let before = self.authorize_grant_change(run, actor, id).await?;
        let snapshot = self.snapshot(run, GRANT_TABLE, id.get(), &before)?;
        run.enter(PipelineState::Mutating);
        self.grants.remove(&mut run.tx, &before).await?;
        let entry = self
            .audit(run, AuditAction::Delete, (Some(snapshot), None), actor, client)
            .await?;
        Ok((before, entry))
    }
}
