//! Procura Core - Shared types for the access-control and audit engine.
//!
//! This crate provides:
//! - Numeric identifiers for actors, groups, records and grants
//! - The ordered [`Role`] and [`AccessLevel`] enums
//! - [`EntityType`], the kinds of access-controlled records
//! - [`OwnedRecord`] with its create and update inputs
//! - [`Actor`] and [`ClientInfo`] request provenance
//!
//! # Example
//!
//! ```
//! use procura_core::{AccessLevel, Role};
//!
//! assert!(Role::Manager.is_privileged());
//! assert!(AccessLevel::Full.satisfies(AccessLevel::Write));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod actor;
mod error;
mod ids;
mod record;
mod types;

pub use actor::{Actor, ClientInfo};
pub use error::{CoreError, CoreResult};
pub use ids::{ActorId, GrantId, GroupId, RecordId};
pub use record::{OwnedRecord, RecordDraft, RecordPatch, RecordRef};
pub use types::{AccessLevel, EntityType, Role, Timestamp};
