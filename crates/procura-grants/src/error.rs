//! Grant and directory error types.

use procura_core::{AccessLevel, ActorId, CoreError, GrantId, GroupId};
use procura_storage::StorageError;
use thiserror::Error;

/// Errors from grants, memberships and the actor/group directories.
#[derive(Debug, Error)]
pub enum GrantError {
    /// A grant must name exactly one of an actor or a group.
    #[error("invalid grant shape: {0}")]
    InvalidShape(&'static str),

    /// Viewers can only hold read grants.
    #[error("cannot grant {level} access to viewer {actor}")]
    ViewerLevel {
        /// Grantee.
        actor: ActorId,
        /// Level that was requested.
        level: AccessLevel,
    },

    /// The grant does not exist.
    #[error("grant not found: {0}")]
    NotFound(GrantId),

    /// The group does not exist.
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    /// The actor does not exist.
    #[error("actor not found: {0}")]
    ActorNotFound(ActorId),

    /// A group with this name already exists.
    #[error("group name already in use: {0}")]
    DuplicateGroup(String),

    /// An actor with this username already exists.
    #[error("username already in use: {0}")]
    DuplicateActor(String),

    /// The group still has members.
    #[error("group {group} still has {members} member(s)")]
    GroupNotEmpty {
        /// The group.
        group: GroupId,
        /// Remaining member count.
        members: usize,
    },

    /// The actor is already a member of the group.
    #[error("{actor} is already a member of {group}")]
    AlreadyMember {
        /// The actor.
        actor: ActorId,
        /// The group.
        group: GroupId,
    },

    /// The actor is not a member of the group.
    #[error("{actor} is not a member of {group}")]
    NotMember {
        /// The actor.
        actor: ActorId,
        /// The group.
        group: GroupId,
    },

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The underlying store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CoreError> for GrantError {
    fn from(e: CoreError) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// Result type for grant operations.
pub type GrantResult<T> = Result<T, GrantError>;
