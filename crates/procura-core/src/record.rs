//! Owned records and the inputs that create or change them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::ids::{ActorId, GroupId, RecordId};
use crate::types::{EntityType, Timestamp};

/// A typed pointer to another record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    /// Type of the referenced record.
    pub entity_type: EntityType,
    /// Identifier of the referenced record.
    pub id: RecordId,
}

impl RecordRef {
    /// Build a reference.
    #[must_use]
    pub const fn new(entity_type: EntityType, id: RecordId) -> Self {
        Self { entity_type, id }
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type.table_name(), self.id.0)
    }
}

/// A persisted, access-controlled record.
///
/// The JSON form of this struct is what the audit trail stores as
/// `old_state` / `new_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedRecord {
    /// Record type.
    pub entity_type: EntityType,
    /// Identifier, unique within the type.
    pub id: RecordId,
    /// Group whose members get default access. `None` for business cases.
    pub owner_group: Option<GroupId>,
    /// Immediate parent in the ownership chain.
    pub parent: Option<RecordRef>,
    /// Non-ownership references (a line item's business case and budget item).
    #[serde(default)]
    pub links: Vec<RecordRef>,
    /// Workflow status.
    pub status: Option<String>,
    /// Set once the status has left draft. Never cleared.
    #[serde(default)]
    pub draft_sealed: bool,
    /// Creating actor.
    pub created_by: ActorId,
    /// Last modifying actor.
    pub updated_by: Option<ActorId>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Option<Timestamp>,
    /// Business fields (title, amounts, codes).
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl OwnedRecord {
    /// Typed reference to this record.
    #[must_use]
    pub fn record_ref(&self) -> RecordRef {
        RecordRef::new(self.entity_type, self.id)
    }

    /// The linked record of `entity_type`, if any. Checks the parent too.
    #[must_use]
    pub fn link(&self, entity_type: EntityType) -> Option<RecordId> {
        self.parent
            .iter()
            .chain(self.links.iter())
            .find(|r| r.entity_type == entity_type)
            .map(|r| r.id)
    }

    /// Every record this one points at (parent first).
    pub fn references(&self) -> impl Iterator<Item = &RecordRef> {
        self.parent.iter().chain(self.links.iter())
    }

    /// Whether the record is still in its initial draft state.
    #[must_use]
    pub fn in_draft(&self, draft_status: &str) -> bool {
        !self.draft_sealed && self.status.as_deref() == Some(draft_status)
    }

    /// Serialize to the JSON state stored in audit entries.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if serialization fails.
    pub fn to_state(&self) -> CoreResult<Value> {
        serde_json::to_value(self).map_err(|e| CoreError::InvalidState(e.to_string()))
    }

    /// Rebuild a record from an audit state blob.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the value is not a record.
    pub fn from_state(state: Value) -> CoreResult<Self> {
        serde_json::from_value(state).map_err(|e| CoreError::InvalidState(e.to_string()))
    }
}

/// Input for creating a record.
///
/// `owner_group` is honoured only for root types. Children always take the
/// group of their parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    /// Declared parent id.
    pub parent: Option<RecordId>,
    /// Caller-supplied owner group.
    pub owner_group: Option<GroupId>,
    /// Non-ownership references.
    #[serde(default)]
    pub links: Vec<RecordRef>,
    /// Initial status. Business cases always start in draft.
    pub status: Option<String>,
    /// Business fields.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RecordDraft {
    /// An empty draft.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the parent.
    #[must_use]
    pub fn with_parent(mut self, parent: RecordId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Supply an owner group.
    #[must_use]
    pub fn with_owner_group(mut self, group: GroupId) -> Self {
        self.owner_group = Some(group);
        self
    }

    /// Add a reference to another record.
    #[must_use]
    pub fn with_link(mut self, entity_type: EntityType, id: RecordId) -> Self {
        self.links.push(RecordRef::new(entity_type, id));
        self
    }

    /// Set the initial status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Set a business field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A partial update.
///
/// Fields set to JSON `null` are removed from the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Fields to merge.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// New status.
    pub status: Option<String>,
    /// New owner group. Only root records can be re-homed.
    pub owner_group: Option<GroupId>,
}

impl RecordPatch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Remove a field.
    #[must_use]
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), Value::Null);
        self
    }

    /// Change the status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Move a root record to another group.
    #[must_use]
    pub fn with_owner_group(mut self, group: GroupId) -> Self {
        self.owner_group = Some(group);
        self
    }

    /// Whether this patch changes the status of `record`.
    #[must_use]
    pub fn changes_status_of(&self, record: &OwnedRecord) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| record.status.as_deref() != Some(s))
    }

    /// Apply the field and status changes to `record`.
    ///
    /// Owner-group changes are left to the caller, which must enforce the
    /// root-only rule. A status that moves away from `draft_status` seals the
    /// draft permanently.
    pub fn apply_to(&self, record: &mut OwnedRecord, draft_status: &str) {
        for (key, value) in &self.fields {
            if value.is_null() {
                record.fields.remove(key);
            } else {
                record.fields.insert(key.clone(), value.clone());
            }
        }
        if let Some(status) = &self.status {
            if status != draft_status {
                record.draft_sealed = true;
            }
            record.status = Some(status.clone());
        }
    }
}
