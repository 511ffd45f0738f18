//! Procura Grants - Explicit record grants, memberships and directories.
//!
//! This crate provides:
//! - [`Grant`] and [`GrantSubject`], with actor/group exclusivity enforced at
//!   construction
//! - [`GrantStore`] for transactional grant CRUD and level lookups
//! - [`MembershipIndex`] for actor-to-group membership
//! - [`GroupDirectory`] and [`ActorDirectory`] for provisioning
//!
//! # Example
//!
//! ```
//! use procura_core::{AccessLevel, ActorId, EntityType, GroupId, RecordId, RecordRef};
//! use procura_grants::{GrantRequest, GrantSubject};
//!
//! let target = RecordRef::new(EntityType::PurchaseOrder, RecordId::new(1));
//! let mut request = GrantRequest::to_actor(target, ActorId::new(2), AccessLevel::Read);
//! assert_eq!(request.subject().unwrap(), GrantSubject::Actor(ActorId::new(2)));
//!
//! request.group_id = Some(GroupId::new(3));
//! assert!(request.subject().is_err());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod directory;
mod error;
mod grant;
mod membership;
mod store;

pub use directory::{ActorDirectory, Group, GroupDirectory};
pub use error::{GrantError, GrantResult};
pub use grant::{Grant, GrantRequest, GrantSubject, GrantUpdate};
pub use membership::{Membership, MembershipIndex};
pub use store::GrantStore;
