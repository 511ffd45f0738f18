//! Prelude module - commonly used types for convenient import.
//!
//! Use `use procura_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Identifiers
pub use crate::{ActorId, GrantId, GroupId, RecordId};

// Ordered enums and time
pub use crate::{AccessLevel, EntityType, Role, Timestamp};

// Records and actors
pub use crate::{Actor, ClientInfo, OwnedRecord, RecordDraft, RecordPatch, RecordRef};
