//! Access decisions for one actor and one record.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use procura_core::{
    AccessLevel, Actor, EntityType, GroupId, OwnedRecord, RecordId, RecordRef, Role, Timestamp,
};
use procura_grants::{GrantStore, GrantSubject, MembershipIndex};
use procura_records::RecordStore;
use procura_storage::Transaction;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AccessResult;
use crate::policy::{DEFAULT_STEPS, PolicyTable, Rule};

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Access granted.
    Allow {
        /// Rule that matched.
        via: Rule,
    },
    /// Access refused.
    Deny {
        /// Human-readable reason.
        reason: String,
    },
}

impl Decision {
    /// Whether access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    fn deny(actor: &Actor, level: AccessLevel, target: RecordRef) -> Self {
        Self::Deny {
            reason: format!("{} lacks {level} access to {target}", actor.id),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow { via } => write!(f, "allowed ({via})"),
            Self::Deny { reason } => write!(f, "denied: {reason}"),
        }
    }
}

/// Actor plus the groups they belong to, loaded once per check.
struct Principal<'a> {
    actor: &'a Actor,
    groups: BTreeSet<GroupId>,
    now: Timestamp,
}

/// Decides whether an actor may act on a record.
#[derive(Debug, Clone)]
pub struct AccessResolver {
    policy: Arc<PolicyTable>,
    records: RecordStore,
    grants: GrantStore,
    members: MembershipIndex,
}

impl AccessResolver {
    /// Create a resolver over `policy`.
    #[must_use]
    pub fn new(policy: Arc<PolicyTable>) -> Self {
        Self {
            policy,
            records: RecordStore::new(),
            grants: GrantStore::new(),
            members: MembershipIndex::new(),
        }
    }

    /// The policy table in use.
    #[must_use]
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    async fn principal<'a>(&self, tx: &Transaction, actor: &'a Actor) -> AccessResult<Principal<'a>> {
        Ok(Principal {
            actor,
            groups: self.members.groups_of(tx, actor.id).await?,
            now: Timestamp::now(),
        })
    }

    /// Decide whether `actor` may access a stored record at `level`.
    ///
    /// An absent record is denied to non-privileged actors with the same
    /// reason as an ordinary denial.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    pub async fn resolve(
        &self,
        tx: &Transaction,
        actor: &Actor,
        entity_type: EntityType,
        id: RecordId,
        level: AccessLevel,
    ) -> AccessResult<Decision> {
        let target = RecordRef::new(entity_type, id);
        if !actor.active {
            return Ok(Decision::deny(actor, level, target));
        }
        if actor.is_privileged() {
            return Ok(Decision::Allow {
                via: Rule::Privileged,
            });
        }
        match self.records.get(tx, entity_type, id).await? {
            Some(record) => self.resolve_record(tx, actor, &record, level).await,
            None => {
                debug!(actor_id = %actor.id, record = %target, "Access check on absent record");
                Ok(Decision::deny(actor, level, target))
            },
        }
    }

    /// Decide against a record the caller has already loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    pub async fn resolve_record(
        &self,
        tx: &Transaction,
        actor: &Actor,
        record: &OwnedRecord,
        level: AccessLevel,
    ) -> AccessResult<Decision> {
        let rules = self.policy.policy(record.entity_type).rules.clone();
        self.evaluate(tx, actor, record, level, rules).await
    }

    /// Decide whether `actor` may move `record` to another status.
    ///
    /// Same as [`resolve_record`](Self::resolve_record) without
    /// [`Rule::DraftCreator`]: a creator may edit their draft but not
    /// take it out of draft alone.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    pub async fn resolve_transition(
        &self,
        tx: &Transaction,
        actor: &Actor,
        record: &OwnedRecord,
        level: AccessLevel,
    ) -> AccessResult<Decision> {
        let rules: Vec<Rule> = self
            .policy
            .policy(record.entity_type)
            .transition_rules()
            .collect();
        self.evaluate(tx, actor, record, level, rules).await
    }

    /// Whether `actor`'s role may create records of `entity_type` at all.
    /// Parent checks are the caller's business.
    #[must_use]
    pub fn authorize_create(&self, actor: &Actor, entity_type: EntityType) -> Decision {
        let min = self.policy.policy(entity_type).create_min_role;
        if actor.active && actor.role.at_least(min) {
            Decision::Allow {
                via: if actor.is_privileged() {
                    Rule::Privileged
                } else {
                    Rule::Creator
                },
            }
        } else {
            Decision::Deny {
                reason: format!("{} may not create {entity_type} records", actor.id),
            }
        }
    }

    async fn evaluate(
        &self,
        tx: &Transaction,
        actor: &Actor,
        record: &OwnedRecord,
        level: AccessLevel,
        rules: Vec<Rule>,
    ) -> AccessResult<Decision> {
        let target = record.record_ref();
        if !actor.active {
            return Ok(Decision::deny(actor, level, target));
        }
        let principal = self.principal(tx, actor).await?;
        for rule in rules {
            if self.rule_allows(tx, &principal, rule, record, level).await? {
                debug!(
                    actor_id = %actor.id,
                    record = %target,
                    %level,
                    %rule,
                    "Access allowed"
                );
                return Ok(Decision::Allow { via: rule });
            }
        }
        debug!(actor_id = %actor.id, record = %target, %level, "Access denied");
        Ok(Decision::deny(actor, level, target))
    }

    async fn rule_allows(
        &self,
        tx: &Transaction,
        who: &Principal<'_>,
        rule: Rule,
        record: &OwnedRecord,
        level: AccessLevel,
    ) -> AccessResult<bool> {
        let actor = who.actor;
        Ok(match rule {
            Rule::Privileged => actor.is_privileged(),
            Rule::Creator | Rule::DirectGrant | Rule::GroupGrant | Rule::OwnerGroup => {
                self.default_step_allows(tx, who, rule, record, level).await?
            },
            Rule::DraftCreator => {
                record.created_by == actor.id
                    && match level {
                        AccessLevel::Read => true,
                        AccessLevel::Write => record.in_draft(self.policy.draft_status()),
                        AccessLevel::Full => false,
                    }
            },
            Rule::RecordGrant => {
                self.default_step_allows(tx, who, Rule::DirectGrant, record, level)
                    .await?
                    || self
                        .default_step_allows(tx, who, Rule::GroupGrant, record, level)
                        .await?
            },
            Rule::LineItemBudget => {
                self.line_item_budget_allows(tx, who, record.record_ref(), level)
                    .await?
            },
        })
    }

    /// Steps 3 to 6 of the default policy. Other rules never match here.
    async fn default_step_allows(
        &self,
        tx: &Transaction,
        who: &Principal<'_>,
        step: Rule,
        record: &OwnedRecord,
        level: AccessLevel,
    ) -> AccessResult<bool> {
        let actor = who.actor;
        let target = record.record_ref();
        Ok(match step {
            Rule::Creator => record.created_by == actor.id,
            Rule::DirectGrant => self
                .grants
                .actor_level(tx, target, actor.id, who.now)
                .await?
                .is_some_and(|held| held.satisfies(level)),
            Rule::GroupGrant => self
                .grants
                .group_level(tx, target, &who.groups, who.now)
                .await?
                .is_some_and(|held| held.satisfies(level)),
            Rule::OwnerGroup => {
                actor.role == Role::User
                    && AccessLevel::Write.satisfies(level)
                    && record.owner_group.is_some_and(|g| who.groups.contains(&g))
            },
            _ => false,
        })
    }

    /// OR across every line item referencing `target`: does the actor reach
    /// `level` on that line item's budget item through the default steps?
    async fn line_item_budget_allows(
        &self,
        tx: &Transaction,
        who: &Principal<'_>,
        target: RecordRef,
        level: AccessLevel,
    ) -> AccessResult<bool> {
        let line_items = self
            .records
            .referencing_of_type(tx, target, EntityType::LineItem)
            .await?;
        for line_item_id in line_items {
            let Some(line_item) = self
                .records
                .get(tx, EntityType::LineItem, line_item_id)
                .await?
            else {
                continue;
            };
            let Some(budget_id) = line_item.link(EntityType::BudgetItem) else {
                continue;
            };
            let Some(budget) = self
                .records
                .get(tx, EntityType::BudgetItem, budget_id)
                .await?
            else {
                continue;
            };
            for step in DEFAULT_STEPS {
                if self
                    .default_step_allows(tx, who, step, &budget, level)
                    .await?
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Ids of every `entity_type` record `actor` may read.
    ///
    /// Equivalent to filtering every record by a Read check, but starts
    /// from the records the actor could plausibly reach.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    pub async fn list_accessible_ids(
        &self,
        tx: &Transaction,
        actor: &Actor,
        entity_type: EntityType,
    ) -> AccessResult<BTreeSet<RecordId>> {
        if !actor.active {
            return Ok(BTreeSet::new());
        }
        if actor.is_privileged() {
            return Ok(self
                .records
                .list_ids(tx, entity_type)
                .await?
                .into_iter()
                .collect());
        }

        let principal = self.principal(tx, actor).await?;
        let mut candidates = self.direct_candidates(tx, &principal, entity_type).await?;

        if entity_type == EntityType::BusinessCase {
            let budgets = self
                .direct_candidates(tx, &principal, EntityType::BudgetItem)
                .await?;
            for budget_id in budgets {
                let budget = RecordRef::new(EntityType::BudgetItem, budget_id);
                for line_item_id in self
                    .records
                    .referencing_of_type(tx, budget, EntityType::LineItem)
                    .await?
                {
                    if let Some(line_item) = self
                        .records
                        .get(tx, EntityType::LineItem, line_item_id)
                        .await?
                        && let Some(case) = line_item.link(EntityType::BusinessCase)
                    {
                        candidates.insert(case);
                    }
                }
            }
        }

        let mut visible = BTreeSet::new();
        for id in candidates {
            let Some(record) = self.records.get(tx, entity_type, id).await? else {
                continue;
            };
            if self
                .resolve_record(tx, actor, &record, AccessLevel::Read)
                .await?
                .is_allowed()
            {
                visible.insert(id);
            }
        }
        Ok(visible)
    }

    /// Records created by the actor, owned by their groups (role User) or
    /// granted to them or their groups.
    async fn direct_candidates(
        &self,
        tx: &Transaction,
        who: &Principal<'_>,
        entity_type: EntityType,
    ) -> AccessResult<BTreeSet<RecordId>> {
        let actor = who.actor;
        let mut ids = self.records.created_by(tx, entity_type, actor.id).await?;
        if actor.role == Role::User {
            for group in &who.groups {
                ids.extend(self.records.owned_by_group(tx, entity_type, *group).await?);
            }
        }
        let mut subjects = vec![GrantSubject::Actor(actor.id)];
        subjects.extend(who.groups.iter().copied().map(GrantSubject::Group));
        ids.extend(
            self.grants
                .granted_ids(tx, &subjects, entity_type, who.now)
                .await?,
        );
        Ok(ids)
    }
}
