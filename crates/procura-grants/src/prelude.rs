//! Prelude module - commonly used types for convenient import.
//!
//! Use `use procura_grants::prelude::*;` to import all essential types.

// Errors
pub use crate::{GrantError, GrantResult};

// Grants
pub use crate::{Grant, GrantRequest, GrantStore, GrantSubject, GrantUpdate};

// Directories
pub use crate::{ActorDirectory, Group, GroupDirectory, Membership, MembershipIndex};
