//! Procura Access - Authorization decisions for owned records.
//!
//! This crate provides:
//! - [`PolicyTable`] and [`AccessPolicy`]: an ordered rule list per entity
//!   type, with the hybrid business-case policy
//! - [`AccessResolver`]: evaluates the policy for one actor, one record and
//!   one requested [`AccessLevel`](procura_core::AccessLevel)
//! - List filtering consistent with single-record checks
//!
//! # Default policy
//!
//! 1. Admin and Manager are allowed everything.
//! 2. The creator is allowed everything.
//! 3. An unexpired grant to the actor, at a sufficient level.
//! 4. An unexpired grant to one of the actor's groups, at a sufficient level.
//! 5. A `User` in the record's owner group, up to Write.
//! 6. Otherwise deny.
//!
//! # Example
//!
//! ```
//! use procura_access::{PolicyTable, Rule};
//! use procura_core::EntityType;
//!
//! let table = PolicyTable::default();
//! assert_eq!(table.policy(EntityType::BusinessCase).rules[1], Rule::DraftCreator);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod policy;
mod resolver;

pub use error::{AccessError, AccessResult};
pub use policy::{AccessPolicy, DEFAULT_DRAFT_STATUS, DEFAULT_STEPS, PolicyTable, Rule};
pub use resolver::{AccessResolver, Decision};
