//! Explicit record grants.
//!
//! A grant gives one subject (an actor *or* a group, never both) an access
//! level on one record, optionally until an expiry time. Expired grants stay
//! stored; they are filtered out whenever they are evaluated.

use std::fmt;

use procura_core::{AccessLevel, ActorId, EntityType, GrantId, GroupId, RecordId, RecordRef, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{GrantError, GrantResult};

/// Who a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum GrantSubject {
    /// A single actor.
    Actor(ActorId),
    /// Every member of a group.
    Group(GroupId),
}

impl GrantSubject {
    /// Build a subject from the optional actor/group pair a request carries.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::InvalidShape`] unless exactly one is present.
    pub fn from_parts(actor: Option<ActorId>, group: Option<GroupId>) -> GrantResult<Self> {
        match (actor, group) {
            (Some(actor), None) => Ok(Self::Actor(actor)),
            (None, Some(group)) => Ok(Self::Group(group)),
            (Some(_), Some(_)) => Err(GrantError::InvalidShape(
                "grant names both an actor and a group",
            )),
            (None, None) => Err(GrantError::InvalidShape(
                "grant names neither an actor nor a group",
            )),
        }
    }

    /// The actor, for actor subjects.
    #[must_use]
    pub fn actor(self) -> Option<ActorId> {
        match self {
            Self::Actor(id) => Some(id),
            Self::Group(_) => None,
        }
    }

    /// The group, for group subjects.
    #[must_use]
    pub fn group(self) -> Option<GroupId> {
        match self {
            Self::Group(id) => Some(id),
            Self::Actor(_) => None,
        }
    }

    pub(crate) fn index_key(self) -> String {
        match self {
            Self::Actor(id) => format!("actor:{}", id.storage_key()),
            Self::Group(id) => format!("group:{}", id.storage_key()),
        }
    }
}

impl fmt::Display for GrantSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Actor(id) => write!(f, "{id}"),
            Self::Group(id) => write!(f, "{id}"),
        }
    }
}

/// A request to share a record, as received from a caller.
///
/// The subject is kept in its raw two-field form; [`GrantRequest::subject`]
/// enforces exclusivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    /// Target record type.
    pub entity_type: EntityType,
    /// Target record id.
    pub entity_id: RecordId,
    /// Grantee actor.
    pub user_id: Option<ActorId>,
    /// Grantee group.
    pub group_id: Option<GroupId>,
    /// Level granted.
    pub access_level: AccessLevel,
    /// Optional expiry.
    pub expires_at: Option<Timestamp>,
}

impl GrantRequest {
    /// A grant for a single actor.
    #[must_use]
    pub fn to_actor(target: RecordRef, actor: ActorId, access_level: AccessLevel) -> Self {
        Self {
            entity_type: target.entity_type,
            entity_id: target.id,
            user_id: Some(actor),
            group_id: None,
            access_level,
            expires_at: None,
        }
    }

    /// A grant for every member of a group.
    #[must_use]
    pub fn to_group(target: RecordRef, group: GroupId, access_level: AccessLevel) -> Self {
        Self {
            entity_type: target.entity_type,
            entity_id: target.id,
            user_id: None,
            group_id: Some(group),
            access_level,
            expires_at: None,
        }
    }

    /// Set an expiry.
    #[must_use]
    pub fn expiring_at(mut self, at: Timestamp) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// The record being shared.
    #[must_use]
    pub fn target(&self) -> RecordRef {
        RecordRef::new(self.entity_type, self.entity_id)
    }

    /// The validated subject.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::InvalidShape`] unless exactly one of
    /// `user_id` and `group_id` is set.
    pub fn subject(&self) -> GrantResult<GrantSubject> {
        GrantSubject::from_parts(self.user_id, self.group_id)
    }
}

/// Changes to an existing grant. Subject and target are immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantUpdate {
    /// New level.
    pub access_level: Option<AccessLevel>,
    /// New expiry. `Some(None)` clears it.
    pub expires_at: Option<Option<Timestamp>>,
}

/// A persisted grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Identifier.
    pub id: GrantId,
    /// Target record type.
    pub entity_type: EntityType,
    /// Target record id.
    pub entity_id: RecordId,
    /// Grantee.
    pub subject: GrantSubject,
    /// Level granted.
    pub access_level: AccessLevel,
    /// Expiry, if time-limited.
    pub expires_at: Option<Timestamp>,
    /// Actor that issued the grant.
    pub granted_by: ActorId,
    /// Issue time.
    pub granted_at: Timestamp,
    /// Last modifying actor.
    pub updated_by: Option<ActorId>,
    /// Last modification time.
    pub updated_at: Option<Timestamp>,
}

impl Grant {
    /// Build a grant from a request.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::InvalidShape`] if the request's subject is not
    /// exactly one of an actor or a group.
    pub fn from_request(id: GrantId, request: &GrantRequest, granted_by: ActorId) -> GrantResult<Self> {
        Ok(Self {
            id,
            entity_type: request.entity_type,
            entity_id: request.entity_id,
            subject: request.subject()?,
            access_level: request.access_level,
            expires_at: request.expires_at,
            granted_by,
            granted_at: Timestamp::now(),
            updated_by: None,
            updated_at: None,
        })
    }

    /// The shared record.
    #[must_use]
    pub fn target(&self) -> RecordRef {
        RecordRef::new(self.entity_type, self.entity_id)
    }

    /// Whether the grant is in force at `now`.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    /// Whether the grant is in force at `now` and covers `requested`.
    #[must_use]
    pub fn allows(&self, requested: AccessLevel, now: Timestamp) -> bool {
        self.is_active(now) && self.access_level.satisfies(requested)
    }

    /// Apply an update, stamping the modifier.
    pub fn apply(&mut self, update: &GrantUpdate, by: ActorId) {
        if let Some(level) = update.access_level {
            self.access_level = level;
        }
        if let Some(expires_at) = update.expires_at {
            self.expires_at = expires_at;
        }
        self.updated_by = Some(by);
        self.updated_at = Some(Timestamp::now());
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn target() -> RecordRef {
        RecordRef::new(EntityType::PurchaseOrder, RecordId::new(3))
    }

    #[test]
    fn test_subject_exclusivity() {
        assert_eq!(
            GrantSubject::from_parts(Some(ActorId::new(1)), None).unwrap(),
            GrantSubject::Actor(ActorId::new(1))
        );
        assert_eq!(
            GrantSubject::from_parts(None, Some(GroupId::new(2))).unwrap(),
            GrantSubject::Group(GroupId::new(2))
        );
        assert!(matches!(
            GrantSubject::from_parts(Some(ActorId::new(1)), Some(GroupId::new(2))),
            Err(GrantError::InvalidShape(_))
        ));
        assert!(matches!(
            GrantSubject::from_parts(None, None),
            Err(GrantError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_from_request_rejects_both_subjects() {
        let mut request = GrantRequest::to_actor(target(), ActorId::new(1), AccessLevel::Read);
        request.group_id = Some(GroupId::new(5));
        assert!(Grant::from_request(GrantId::new(1), &request, ActorId::new(9)).is_err());
    }

    #[test]
    fn test_expiry() {
        let now = Timestamp::now();
        let request = GrantRequest::to_group(target(), GroupId::new(2), AccessLevel::Write)
            .expiring_at(now.offset(Duration::hours(1)));
        let grant = Grant::from_request(GrantId::new(1), &request, ActorId::new(9)).unwrap();

        assert!(grant.allows(AccessLevel::Read, now));
        assert!(grant.allows(AccessLevel::Write, now));
        assert!(!grant.allows(AccessLevel::Full, now));
        assert!(!grant.is_active(now.offset(Duration::hours(2))));
    }

    #[test]
    fn test_apply_update() {
        let request = GrantRequest::to_actor(target(), ActorId::new(1), AccessLevel::Read)
            .expiring_at(Timestamp::now());
        let mut grant = Grant::from_request(GrantId::new(1), &request, ActorId::new(9)).unwrap();
        grant.apply(
            &GrantUpdate {
                access_level: Some(AccessLevel::Full),
                expires_at: Some(None),
            },
            ActorId::new(9),
        );
        assert_eq!(grant.access_level, AccessLevel::Full);
        assert!(grant.expires_at.is_none());
        assert_eq!(grant.updated_by, Some(ActorId::new(9)));
    }

    #[test]
    fn test_subject_serde_shape() {
        let json = serde_json::to_value(GrantSubject::Group(GroupId::new(4))).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "group", "id": 4}));
    }
}
