//! The engine facade: every read and write enters here.

use std::collections::BTreeSet;
use std::sync::Arc;

use procura_access::{AccessResolver, Decision, PolicyTable, Rule};
use procura_audit::{
    AuditAction, AuditEntry, AuditLog, AuditRecorder, AuditSink, ChainVerificationResult, KvAuditSink,
    MutationRecord, Snapshot, StreamKey,
};
use procura_core::{
    AccessLevel, Actor, ClientInfo, EntityType, GrantId, GroupId, RecordId, RecordRef, Role,
};
use procura_crypto::{KeyPair, PublicKey};
use procura_grants::{ActorDirectory, Grant, GrantStore, GroupDirectory, MembershipIndex};
use procura_records::{InheritanceResolver, RecordStore};
use procura_storage::{KvStore, Transaction};
use procura_telemetry::RequestContext;
use serde::Serialize;
use tracing::{Instrument, debug};

use crate::error::{PipelineError, PipelineResult};
use crate::grants::GRANT_TABLE;
use crate::state::{PipelineState, Run};

/// Number of entries [`Engine::audit_recent`] returns when no limit is given.
pub const DEFAULT_RECENT_LIMIT: usize = 100;

/// Access-control resolution and audited mutation over one store.
///
/// The engine holds no per-request state. Each operation opens its own
/// transaction, and each mutation commits its data and audit entry together
/// or not at all.
///
/// Every operation takes the acting [`Actor`] as given, including its
/// `active` flag and role. Callers must pass a freshly loaded actor (see
/// [`load_actor`](Self::load_actor)); a copy held across a deactivation or
/// role change keeps its old rights.
pub struct Engine {
    pub(crate) store: Arc<dyn KvStore>,
    signer: Arc<KeyPair>,
    pub(crate) resolver: AccessResolver,
    pub(crate) inheritance: InheritanceResolver,
    pub(crate) records: RecordStore,
    pub(crate) grants: GrantStore,
    pub(crate) members: MembershipIndex,
    pub(crate) groups: GroupDirectory,
    pub(crate) actors: ActorDirectory,
    recorder: AuditRecorder,
    log: AuditLog,
    recent_limit: usize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("recorder", &self.recorder)
            .field("recent_limit", &self.recent_limit)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine over `store`. Audit entries go into the same store
    /// and are signed with `signer`.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, signer: Arc<KeyPair>, policy: PolicyTable) -> Self {
        let recorder = AuditRecorder::new(Arc::clone(&signer), Arc::new(KvAuditSink::new()));
        Self {
            log: AuditLog::new(Arc::clone(&store)),
            store,
            signer,
            resolver: AccessResolver::new(Arc::new(policy)),
            inheritance: InheritanceResolver::new(),
            records: RecordStore::new(),
            grants: GrantStore::new(),
            members: MembershipIndex::new(),
            groups: GroupDirectory::new(),
            actors: ActorDirectory::new(),
            recorder,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    /// Replace the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.recorder = AuditRecorder::new(Arc::clone(&self.signer), sink);
        self
    }

    /// Set the default page size of [`audit_recent`](Self::audit_recent).
    #[must_use]
    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    /// The policy table in use.
    #[must_use]
    pub fn policy(&self) -> &PolicyTable {
        self.resolver.policy()
    }

    /// Public half of the audit signing key.
    #[must_use]
    pub fn signer(&self) -> PublicKey {
        self.recorder.signer()
    }

    /// Read access to the audit log, without role checks.
    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.log
    }

    /// Start a transaction for a handler that manages its own writes and
    /// audits them with [`record_mutation`](Self::record_mutation).
    #[must_use]
    pub fn begin(&self) -> Transaction {
        Transaction::begin(Arc::clone(&self.store))
    }

    pub(crate) fn context(
        operation: &str,
        actor: &Actor,
        client: &ClientInfo,
    ) -> RequestContext {
        RequestContext::new("pipeline", operation)
            .with_actor(actor.id)
            .with_client(client.clone())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Decide whether `actor` may access a record at `level`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if a lookup fails. A denial is an
    /// `Ok(Decision::Deny { .. })`, not an error.
    pub async fn check_access(
        &self,
        actor: &Actor,
        entity_type: EntityType,
        id: RecordId,
        level: AccessLevel,
    ) -> PipelineResult<Decision> {
        let ctx = Self::context("check_access", actor, &ClientInfo::default());
        async {
            let tx = self.begin();
            let decision = self
                .resolver
                .resolve(&tx, actor, entity_type, id, level)
                .await?;
            debug!(
                record = %RecordRef::new(entity_type, id),
                %level,
                %decision,
                "Access decision"
            );
            Ok::<_, PipelineError>(decision)
        }
        .instrument(ctx.span())
        .await
    }

    /// Ids of every `entity_type` record `actor` may read.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if a lookup fails.
    pub async fn list_accessible_ids(
        &self,
        actor: &Actor,
        entity_type: EntityType,
    ) -> PipelineResult<BTreeSet<RecordId>> {
        let ctx = Self::context("list_accessible_ids", actor, &ClientInfo::default());
        async {
            let tx = self.begin();
            let ids = self
                .resolver
                .list_accessible_ids(&tx, actor, entity_type)
                .await?;
            debug!(entity = %entity_type, visible = ids.len(), "Listed accessible records");
            Ok::<_, PipelineError>(ids)
        }
        .instrument(ctx.span())
        .await
    }

    /// The owner group a new child of `parent_type:parent_id` would inherit.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ParentMissing`] if the parent does not exist.
    pub async fn resolve_owner_group(
        &self,
        parent_type: EntityType,
        parent_id: RecordId,
    ) -> PipelineResult<GroupId> {
        let tx = self.begin();
        Ok(self
            .inheritance
            .resolve_owner_group(&tx, parent_type, parent_id)
            .await?)
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// Audit a mutation a handler staged in its own transaction.
    ///
    /// The entry is staged in `tx` and becomes durable when the handler
    /// commits. On error the handler must drop `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AuditWriteFailed`] if the entry cannot be
    /// built or staged.
    pub async fn record_mutation(
        &self,
        tx: &mut Transaction,
        mutation: MutationRecord,
    ) -> PipelineResult<AuditEntry> {
        self.recorder
            .record_mutation(tx, mutation)
            .await
            .map_err(|e| PipelineError::audit_write_failed(&e))
    }

    /// A record's audit stream, oldest first.
    ///
    /// Requires role User, and then:
    ///
    /// - for an owned record, Read on it. A deleted record's history is left
    ///   to privileged actors.
    /// - for a grant, Manager or Full on the grant's target. A revoked
    ///   grant's target is taken from its last captured state.
    /// - for actors, groups, memberships and handler-managed tables, Manager.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] if a check fails and
    /// [`PipelineError::AuditLog`] if the log cannot be read.
    pub async fn audit_history(
        &self,
        actor: &Actor,
        table_name: &str,
        record_id: u64,
    ) -> PipelineResult<Vec<AuditEntry>> {
        require_role(actor, Role::User, "read audit history")?;
        let entries = self
            .log
            .history(table_name, record_id)
            .await
            .map_err(PipelineError::AuditLog)?;
        self.authorize_history(actor, table_name, record_id, &entries)
            .await?;
        Ok(entries)
    }

    async fn authorize_history(
        &self,
        actor: &Actor,
        table_name: &str,
        record_id: u64,
        entries: &[AuditEntry],
    ) -> PipelineResult<()> {
        let tx = self.begin();
        if let Some(entity_type) = EntityType::from_table_name(table_name) {
            let decision = self
                .resolver
                .resolve(&tx, actor, entity_type, RecordId::new(record_id), AccessLevel::Read)
                .await?;
            return allowed(decision).map(drop);
        }
        if table_name == GRANT_TABLE && !actor.is_privileged() {
            let grant = match self.grants.get(&tx, GrantId::new(record_id)).await? {
                Some(grant) => Some(grant),
                None => entries
                    .iter()
                    .rev()
                    .find_map(|e| e.new_state.as_ref().or(e.old_state.as_ref()))
                    .and_then(|state| serde_json::from_value::<Grant>(state.clone()).ok()),
            };
            if let Some(grant) = grant {
                let decision = self
                    .resolver
                    .resolve(&tx, actor, grant.entity_type, grant.entity_id, AccessLevel::Full)
                    .await?;
                return allowed(decision).map(drop);
            }
        }
        require_role(actor, Role::Manager, &format!("read {table_name} audit history"))
    }

    /// The newest entries across all streams. Requires role Manager.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Manager and
    /// [`PipelineError::AuditLog`] if the log cannot be read.
    pub async fn audit_recent(
        &self,
        actor: &Actor,
        limit: Option<usize>,
    ) -> PipelineResult<Vec<AuditEntry>> {
        require_role(actor, Role::Manager, "list the audit log")?;
        self.log
            .recent(limit.unwrap_or(self.recent_limit))
            .await
            .map_err(PipelineError::AuditLog)
    }

    /// Verify one record's audit chain. Requires role Manager.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Manager and
    /// [`PipelineError::AuditLog`] if the log cannot be read.
    pub async fn verify_audit_chain(
        &self,
        actor: &Actor,
        table_name: &str,
        record_id: u64,
    ) -> PipelineResult<ChainVerificationResult> {
        require_role(actor, Role::Manager, "verify the audit log")?;
        self.log
            .verify_chain(table_name, record_id)
            .await
            .map_err(PipelineError::AuditLog)
    }

    /// Verify every audit chain. Requires role Manager.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Denied`] below Manager and
    /// [`PipelineError::AuditLog`] if the log cannot be read.
    pub async fn verify_audit_log(
        &self,
        actor: &Actor,
    ) -> PipelineResult<Vec<(StreamKey, ChainVerificationResult)>> {
        require_role(actor, Role::Manager, "verify the audit log")?;
        self.log.verify_all().await.map_err(PipelineError::AuditLog)
    }

    /// Capture a row's state before it is changed.
    pub(crate) fn snapshot<T: Serialize>(
        &self,
        run: &mut Run,
        table_name: &str,
        record_id: u64,
        row: &T,
    ) -> PipelineResult<Snapshot> {
        run.enter(PipelineState::Snapshotting);
        self.recorder
            .before_mutate(table_name, record_id, row)
            .map_err(|e| PipelineError::audit_write_failed(&e))
    }

    /// Capture a row's state after it was changed.
    pub(crate) fn capture<T: Serialize>(
        table_name: &str,
        record_id: u64,
        row: &T,
    ) -> PipelineResult<Snapshot> {
        Snapshot::capture(table_name, record_id, row)
            .map_err(|e| PipelineError::audit_write_failed(&e))
    }

    /// Chain, sign and stage the entry for a staged change.
    pub(crate) async fn audit(
        &self,
        run: &mut Run,
        action: AuditAction,
        (before, after): (Option<Snapshot>, Option<Snapshot>),
        actor: &Actor,
        client: &ClientInfo,
    ) -> PipelineResult<AuditEntry> {
        run.enter(PipelineState::Auditing);
        self.recorder
            .after_mutate(&mut run.tx, action, before, after, actor.id, client)
            .await
            .map_err(|e| PipelineError::audit_write_failed(&e))
    }
}

/// Turn a decision into a result.
pub(crate) fn allowed(decision: Decision) -> PipelineResult<Rule> {
    match decision {
        Decision::Allow { via } => Ok(via),
        Decision::Deny { reason } => Err(PipelineError::Denied { reason }),
    }
}

/// Require an active actor with at least `min`.
pub(crate) fn require_role(actor: &Actor, min: Role, operation: &str) -> PipelineResult<()> {
    if actor.active && actor.role.at_least(min) {
        Ok(())
    } else {
        Err(PipelineError::Denied {
            reason: format!("{} needs role {min} to {operation}", actor.id),
        })
    }
}
