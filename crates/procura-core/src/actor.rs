//! Actors and request provenance.

use serde::{Deserialize, Serialize};

use crate::ids::ActorId;
use crate::types::{Role, Timestamp};

/// An authenticated identity acting on the engine.
///
/// Every engine operation takes the actor as an explicit argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Unique identifier.
    pub id: ActorId,
    /// Login name.
    pub username: String,
    /// Position in the role hierarchy.
    pub role: Role,
    /// Deactivated actors are denied everything.
    pub active: bool,
    /// Provisioning time.
    pub created_at: Timestamp,
}

impl Actor {
    /// Create an active actor.
    #[must_use]
    pub fn new(id: ActorId, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role,
            active: true,
            created_at: Timestamp::now(),
        }
    }

    /// Whether the actor bypasses record-level checks.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.active && self.role.is_privileged()
    }
}

/// Where a request came from. Recorded on every audit entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Remote address as reported by the transport.
    pub ip: Option<String>,
    /// User agent string, if any.
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Client info with just an address.
    #[must_use]
    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_agent: None,
        }
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
