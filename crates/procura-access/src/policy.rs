//! The access policy table.
//!
//! Each entity type has an ordered list of [`Rule`]s. Resolution walks the
//! list and the first rule that allows wins; a rule that does not allow
//! falls through to the next one. If none allows, access is denied.

use std::collections::BTreeMap;
use std::fmt;

use procura_core::{EntityType, Role};
use serde::{Deserialize, Serialize};

/// Status a business case starts in, unless configured otherwise.
pub const DEFAULT_DRAFT_STATUS: &str = "Draft";

/// One step of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Admin and Manager roles are allowed any level.
    Privileged,
    /// The creating actor is allowed any level.
    Creator,
    /// An unexpired grant to the actor on the record.
    DirectGrant,
    /// An unexpired grant on the record to a group the actor is in.
    GroupGrant,
    /// A `User` in the record's owner group is allowed up to Write.
    OwnerGroup,
    /// The creator may read, and write while the record is still in draft.
    DraftCreator,
    /// Access reached through the budget item of any line item that
    /// references the record, evaluated with the default non-privileged
    /// rules.
    LineItemBudget,
    /// An unexpired grant on the record to the actor or one of their groups.
    RecordGrant,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Privileged => "privileged role",
            Self::Creator => "creator",
            Self::DirectGrant => "direct grant",
            Self::GroupGrant => "group grant",
            Self::OwnerGroup => "owner group",
            Self::DraftCreator => "draft creator",
            Self::LineItemBudget => "line item budget",
            Self::RecordGrant => "record grant",
        };
        f.write_str(s)
    }
}

/// The default non-privileged steps, shared by every owned type and reused
/// by [`Rule::LineItemBudget`] on budget items.
pub const DEFAULT_STEPS: [Rule; 4] = [
    Rule::Creator,
    Rule::DirectGrant,
    Rule::GroupGrant,
    Rule::OwnerGroup,
];

/// Policy for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Rules in priority order.
    pub rules: Vec<Rule>,
    /// Minimum role needed to create a record of this type.
    pub create_min_role: Role,
}

impl AccessPolicy {
    /// The default policy for chained and root records.
    #[must_use]
    pub fn default_owned() -> Self {
        let mut rules = vec![Rule::Privileged];
        rules.extend(DEFAULT_STEPS);
        Self {
            rules,
            create_min_role: Role::User,
        }
    }

    /// The hybrid policy for business cases.
    ///
    /// There is no [`Rule::Creator`] here: a creator tops out at Write on an
    /// open draft, so deleting or sharing one takes a privileged actor or a
    /// Full grant.
    #[must_use]
    pub fn hybrid() -> Self {
        Self {
            rules: vec![
                Rule::Privileged,
                Rule::DraftCreator,
                Rule::LineItemBudget,
                Rule::RecordGrant,
            ],
            create_min_role: Role::User,
        }
    }

    /// The rules that apply to a status transition: the same list without
    /// [`Rule::DraftCreator`].
    pub fn transition_rules(&self) -> impl Iterator<Item = Rule> + '_ {
        self.rules
            .iter()
            .copied()
            .filter(|r| *r != Rule::DraftCreator)
    }
}

/// Policies for every entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    draft_status: String,
    policies: BTreeMap<EntityType, AccessPolicy>,
}

impl PolicyTable {
    /// The standard table, with business cases starting in `draft_status`.
    #[must_use]
    pub fn new(draft_status: impl Into<String>) -> Self {
        let policies = EntityType::ALL
            .into_iter()
            .map(|ty| {
                let policy = if ty == EntityType::BusinessCase {
                    AccessPolicy::hybrid()
                } else {
                    AccessPolicy::default_owned()
                };
                (ty, policy)
            })
            .collect();
        Self {
            draft_status: draft_status.into(),
            policies,
        }
    }

    /// Replace the policy of one type.
    #[must_use]
    pub fn with_policy(mut self, entity_type: EntityType, policy: AccessPolicy) -> Self {
        self.policies.insert(entity_type, policy);
        self
    }

    /// The status records start in and that [`Rule::DraftCreator`] checks.
    #[must_use]
    pub fn draft_status(&self) -> &str {
        &self.draft_status
    }

    /// Policy for `entity_type`.
    #[must_use]
    pub fn policy(&self, entity_type: EntityType) -> &AccessPolicy {
        self.policies
            .get(&entity_type)
            .unwrap_or(&FALLBACK)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new(DEFAULT_DRAFT_STATUS)
    }
}

// Used only if a table was built without an entry for a type: deny all.
static FALLBACK: AccessPolicy = AccessPolicy {
    rules: Vec::new(),
    create_min_role: Role::Admin,
};
